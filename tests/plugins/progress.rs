use learnstate::core::config::{CompletionPolicy, StoreConfig};
use learnstate::core::store::Store;
use learnstate::plugins::catalog::{self, NewCourse, NewTopic};
use learnstate::plugins::enrollment;
use learnstate::plugins::progress::{
    complete_topic, get_progress, list_topic_progress, record_topic_access, recompute_progress,
    uncomplete_topic,
};
use learnstate::plugins::users;
use rusqlite::params;
use tempfile::tempdir;

struct Fixture {
    _tmp: tempfile::TempDir,
    store: Store,
    course: String,
    module: String,
    topics: Vec<String>,
    user: String,
}

fn fixture_with(config: StoreConfig, topic_count: i64) -> Fixture {
    let tmp = tempdir().unwrap();
    let store = Store::open_with_config(tmp.path(), config).unwrap();
    let course = catalog::create_course(&store, NewCourse::titled("Rust")).unwrap().id;
    let module = catalog::add_module(&store, &course, "Basics", 1).unwrap().id;
    let topics = (1..=topic_count)
        .map(|ord| add_topic(&store, &module, ord))
        .collect();
    let user = users::create_user(&store, "ada@example.com", "Ada").unwrap().id;
    enrollment::enroll(&store, &user, &course).unwrap();
    Fixture {
        _tmp: tmp,
        store,
        course,
        module,
        topics,
        user,
    }
}

fn fixture(topic_count: i64) -> Fixture {
    fixture_with(StoreConfig::default(), topic_count)
}

fn add_topic(store: &Store, module: &str, ord: i64) -> String {
    catalog::add_topic(
        store,
        NewTopic {
            module_id: module.to_string(),
            title: format!("Topic {}", ord),
            estimated_duration_minutes: 10,
            ord,
            is_previewable: false,
        },
    )
    .unwrap()
    .id
}

fn monotonic() -> StoreConfig {
    let mut config = StoreConfig::default();
    config.progress.completion_policy = CompletionPolicy::Monotonic;
    config
}

#[test]
fn percentage_follows_completed_topics() {
    let f = fixture(4);
    complete_topic(&f.store, &f.user, &f.topics[0]).unwrap();
    let p = complete_topic(&f.store, &f.user, &f.topics[1]).unwrap();
    assert_eq!((p.completed_topics_count, p.total_topics_count), (2, 4));
    assert_eq!(p.progress_percentage, 50.0);

    let p = complete_topic(&f.store, &f.user, &f.topics[2]).unwrap();
    assert_eq!(p.progress_percentage, 75.0);

    let p = uncomplete_topic(&f.store, &f.user, &f.topics[0]).unwrap();
    assert_eq!(p.completed_topics_count, 2);
    assert_eq!(p.progress_percentage, 50.0);
    assert_eq!(p.completed_at, None);
}

#[test]
fn completing_twice_counts_once() {
    let f = fixture(3);
    complete_topic(&f.store, &f.user, &f.topics[0]).unwrap();
    let p = complete_topic(&f.store, &f.user, &f.topics[0]).unwrap();
    assert_eq!(p.completed_topics_count, 1);
    assert_eq!(p.progress_percentage, 33.33);

    let records = list_topic_progress(&f.store, &f.user, &f.course).unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].is_completed);
    assert!(records[0].completed_at.is_some());
}

#[test]
fn uncompleting_clears_topic_time() {
    let f = fixture(2);
    complete_topic(&f.store, &f.user, &f.topics[0]).unwrap();
    uncomplete_topic(&f.store, &f.user, &f.topics[0]).unwrap();
    let records = list_topic_progress(&f.store, &f.user, "rust").unwrap();
    assert_eq!(records.len(), 1);
    assert!(!records[0].is_completed);
    assert_eq!(records[0].completed_at, None);
}

#[test]
fn full_completion_sets_completed_at() {
    let f = fixture(2);
    complete_topic(&f.store, &f.user, &f.topics[0]).unwrap();
    let p = complete_topic(&f.store, &f.user, &f.topics[1]).unwrap();
    assert_eq!(p.progress_percentage, 100.0);
    let first = p.completed_at.expect("complete course has completed_at");

    // Re-completing a topic keeps the first completion time.
    let again = complete_topic(&f.store, &f.user, &f.topics[1]).unwrap();
    assert_eq!(again.completed_at, Some(first));
}

#[test]
fn reversible_policy_clears_completed_at() {
    let f = fixture(2);
    complete_topic(&f.store, &f.user, &f.topics[0]).unwrap();
    complete_topic(&f.store, &f.user, &f.topics[1]).unwrap();
    let p = uncomplete_topic(&f.store, &f.user, &f.topics[1]).unwrap();
    assert_eq!(p.progress_percentage, 50.0);
    assert_eq!(p.completed_at, None);
}

#[test]
fn monotonic_policy_keeps_completed_at() {
    let f = fixture_with(monotonic(), 2);
    complete_topic(&f.store, &f.user, &f.topics[0]).unwrap();
    let done = complete_topic(&f.store, &f.user, &f.topics[1]).unwrap();
    let p = uncomplete_topic(&f.store, &f.user, &f.topics[1]).unwrap();
    assert_eq!(p.progress_percentage, 50.0);
    assert_eq!(p.completed_at, done.completed_at);
    assert!(p.completed_at.is_some());
}

#[test]
fn new_topic_lowers_percentage_for_enrolled_learners() {
    let f = fixture(2);
    complete_topic(&f.store, &f.user, &f.topics[0]).unwrap();
    complete_topic(&f.store, &f.user, &f.topics[1]).unwrap();

    add_topic(&f.store, &f.module, 3);
    add_topic(&f.store, &f.module, 4);
    let p = get_progress(&f.store, &f.user, &f.course).unwrap();
    assert_eq!((p.completed_topics_count, p.total_topics_count), (2, 4));
    assert_eq!(p.progress_percentage, 50.0);
    assert_eq!(p.completed_at, None);
}

#[test]
fn deleting_completed_topic_recomputes_counts() {
    let f = fixture(4);
    complete_topic(&f.store, &f.user, &f.topics[0]).unwrap();
    complete_topic(&f.store, &f.user, &f.topics[1]).unwrap();

    catalog::delete_topic(&f.store, &f.topics[0]).unwrap();
    let p = get_progress(&f.store, &f.user, &f.course).unwrap();
    assert_eq!((p.completed_topics_count, p.total_topics_count), (1, 3));
    assert_eq!(p.progress_percentage, 33.33);
}

#[test]
fn empty_course_uses_configured_percentage() {
    let f = fixture(0);
    let p = get_progress(&f.store, &f.user, &f.course).unwrap();
    assert_eq!(p.progress_percentage, 100.0);
    assert!(p.completed_at.is_some());

    let mut config = StoreConfig::default();
    config.progress.empty_course_percentage = 0.0;
    let f = fixture_with(config, 0);
    let p = get_progress(&f.store, &f.user, &f.course).unwrap();
    assert_eq!(p.progress_percentage, 0.0);
    assert_eq!(p.completed_at, None);
}

#[test]
fn first_topic_in_empty_course_resets_completion() {
    let f = fixture(0);
    add_topic(&f.store, &f.module, 1);
    let p = get_progress(&f.store, &f.user, &f.course).unwrap();
    assert_eq!((p.completed_topics_count, p.total_topics_count), (0, 1));
    assert_eq!(p.progress_percentage, 0.0);
    assert_eq!(p.completed_at, None);
}

#[test]
fn unenrolled_learner_cannot_progress() {
    let f = fixture(2);
    let stranger = users::create_user(&f.store, "bob@example.com", "Bob").unwrap().id;
    let err = complete_topic(&f.store, &stranger, &f.topics[0]).unwrap_err();
    assert_eq!(err.kind(), "validation");
    assert!(err.to_string().contains("not enrolled"));
    assert_eq!(get_progress(&f.store, &stranger, &f.course).unwrap_err().kind(), "validation");
    assert_eq!(complete_topic(&f.store, &f.user, "missing").unwrap_err().kind(), "not_found");
}

#[test]
fn topic_access_is_remembered() {
    let f = fixture(2);
    let p = record_topic_access(&f.store, &f.user, &f.topics[1]).unwrap();
    assert_eq!(p.last_accessed_topic_id.as_deref(), Some(f.topics[1].as_str()));
    assert_eq!(p.completed_topics_count, 0);
}

#[test]
fn recompute_repairs_corrupted_row() {
    let f = fixture(4);
    complete_topic(&f.store, &f.user, &f.topics[0]).unwrap();
    let before = get_progress(&f.store, &f.user, &f.course).unwrap();

    f.store
        .write("test.corrupt", |conn| {
            conn.execute(
                "UPDATE course_progress SET completed_topics_count = 3, progress_percentage = 75.0 WHERE id = ?1",
                params![before.id],
            )?;
            Ok(())
        })
        .unwrap();

    assert!(recompute_progress(&f.store, &before.id).unwrap().is_fresh());
    let after = get_progress(&f.store, &f.user, &f.course).unwrap();
    assert_eq!(after, before);

    assert!(!recompute_progress(&f.store, "missing").unwrap().is_fresh());
}
