use learnstate::core::store::Store;
use learnstate::plugins::catalog::{
    self, CourseLevel, NewCourse, NewTopic, TopicUpdate, add_module, add_topic, create_category,
    create_course, delete_module, delete_topic, get_course, list_courses, list_modules, list_topics,
    publish_course, update_topic,
};
use tempfile::tempdir;

fn topic(module_id: &str, title: &str, ord: i64, minutes: i64) -> NewTopic {
    NewTopic {
        module_id: module_id.to_string(),
        title: title.to_string(),
        estimated_duration_minutes: minutes,
        ord,
        is_previewable: false,
    }
}

fn duration(store: &Store, course_id: &str) -> i64 {
    get_course(store, course_id).unwrap().total_duration_minutes
}

#[test]
fn new_course_starts_at_zero_state() {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path()).unwrap();
    let course = create_course(
        &store,
        NewCourse {
            title: "Intro to Rust".to_string(),
            level: CourseLevel::Intermediate,
            price_cents: 1999,
            ..NewCourse::default()
        },
    )
    .unwrap();

    assert_eq!(course.slug, "intro-to-rust");
    assert_eq!(course.level, CourseLevel::Intermediate);
    assert_eq!(course.average_rating, 0.0);
    assert_eq!(course.total_reviews, 0);
    assert_eq!(course.total_enrollments, 0);
    assert_eq!(course.total_duration_minutes, 0);
    assert!(!course.is_published);
}

#[test]
fn slugs_are_unique() {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path()).unwrap();
    let a = create_course(&store, NewCourse::titled("Rust")).unwrap();
    let b = create_course(&store, NewCourse::titled("Rust")).unwrap();
    let c = create_course(&store, NewCourse::titled("???")).unwrap();
    assert_eq!(a.slug, "rust");
    assert_eq!(b.slug, "rust-1");
    assert_eq!(c.slug, "course");
    assert_eq!(get_course(&store, "rust-1").unwrap().id, b.id);
}

#[test]
fn invalid_course_input_is_rejected() {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path()).unwrap();
    assert_eq!(
        create_course(&store, NewCourse::titled("  ")).unwrap_err().kind(),
        "validation"
    );
    let priced = NewCourse {
        price_cents: -1,
        ..NewCourse::titled("Rust")
    };
    assert_eq!(create_course(&store, priced).unwrap_err().kind(), "validation");
    let orphan = NewCourse {
        category_id: Some("missing".to_string()),
        ..NewCourse::titled("Rust")
    };
    assert_eq!(create_course(&store, orphan).unwrap_err().kind(), "conflict");
}

#[test]
fn publish_sets_published_at_once() {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path()).unwrap();
    let category = create_category(&store, "Systems Programming", None).unwrap();
    assert_eq!(category.slug, "systems-programming");
    let course = create_course(
        &store,
        NewCourse {
            category_id: Some(category.id),
            ..NewCourse::titled("Rust")
        },
    )
    .unwrap();

    let first = publish_course(&store, &course.id).unwrap();
    assert!(first.is_published);
    let published_at = first.published_at.unwrap();
    let second = publish_course(&store, &course.id).unwrap();
    assert_eq!(second.published_at, Some(published_at));

    create_course(&store, NewCourse::titled("Draft")).unwrap();
    assert_eq!(list_courses(&store, true).unwrap().len(), 1);
    assert_eq!(list_courses(&store, false).unwrap().len(), 2);
    assert_eq!(publish_course(&store, "missing").unwrap_err().kind(), "not_found");
}

#[test]
fn topic_add_and_delete_move_duration() {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path()).unwrap();
    let course = create_course(&store, NewCourse::titled("Rust")).unwrap();
    let basics = add_module(&store, &course.id, "Basics", 1).unwrap();
    let advanced = add_module(&store, &course.id, "Advanced", 2).unwrap();

    add_topic(&store, topic(&basics.id, "Ownership", 1, 12)).unwrap();
    add_topic(&store, topic(&advanced.id, "Lifetimes", 1, 8)).unwrap();
    assert_eq!(duration(&store, &course.id), 20);

    let extra = add_topic(&store, topic(&basics.id, "Borrowing", 2, 10)).unwrap();
    assert_eq!(duration(&store, &course.id), 30);

    delete_topic(&store, &extra.id).unwrap();
    assert_eq!(duration(&store, &course.id), 20);
}

#[test]
fn duration_update_recomputes_total() {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path()).unwrap();
    let course = create_course(&store, NewCourse::titled("Rust")).unwrap();
    let module = add_module(&store, &course.id, "Basics", 1).unwrap();
    let t = add_topic(&store, topic(&module.id, "Ownership", 1, 12)).unwrap();

    let renamed = update_topic(
        &store,
        &t.id,
        TopicUpdate {
            title: Some("Ownership rules".to_string()),
            ..TopicUpdate::default()
        },
    )
    .unwrap();
    assert_eq!(renamed.title, "Ownership rules");
    assert_eq!(renamed.estimated_duration_minutes, 12);
    assert_eq!(duration(&store, &course.id), 12);

    update_topic(
        &store,
        &t.id,
        TopicUpdate {
            estimated_duration_minutes: Some(25),
            ..TopicUpdate::default()
        },
    )
    .unwrap();
    assert_eq!(duration(&store, &course.id), 25);

    let err = update_topic(
        &store,
        &t.id,
        TopicUpdate {
            estimated_duration_minutes: Some(-1),
            ..TopicUpdate::default()
        },
    )
    .unwrap_err();
    assert_eq!(err.kind(), "validation");
}

#[test]
fn deleting_module_cascades_topics_into_duration() {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path()).unwrap();
    let course = create_course(&store, NewCourse::titled("Rust")).unwrap();
    let keep = add_module(&store, &course.id, "Keep", 1).unwrap();
    let drop = add_module(&store, &course.id, "Drop", 2).unwrap();
    add_topic(&store, topic(&keep.id, "A", 1, 5)).unwrap();
    add_topic(&store, topic(&drop.id, "B", 1, 7)).unwrap();
    add_topic(&store, topic(&drop.id, "C", 2, 9)).unwrap();
    assert_eq!(duration(&store, &course.id), 21);

    delete_module(&store, &drop.id).unwrap();
    assert_eq!(duration(&store, &course.id), 5);
    assert_eq!(list_topics(&store, &course.id).unwrap().len(), 1);

    delete_module(&store, &keep.id).unwrap();
    assert_eq!(duration(&store, &course.id), 0);
}

#[test]
fn ordering_conflicts_are_reported() {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path()).unwrap();
    let course = create_course(&store, NewCourse::titled("Rust")).unwrap();
    let module = add_module(&store, &course.id, "Basics", 1).unwrap();
    assert_eq!(
        add_module(&store, &course.id, "Again", 1).unwrap_err().kind(),
        "conflict"
    );
    add_topic(&store, topic(&module.id, "A", 1, 5)).unwrap();
    assert_eq!(
        add_topic(&store, topic(&module.id, "B", 1, 5)).unwrap_err().kind(),
        "conflict"
    );
    assert_eq!(duration(&store, &course.id), 5);
}

#[test]
fn topics_list_in_module_then_topic_order() {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path()).unwrap();
    let course = create_course(&store, NewCourse::titled("Rust")).unwrap();
    let second = add_module(&store, &course.id, "Second", 2).unwrap();
    let first = add_module(&store, &course.id, "First", 1).unwrap();
    add_topic(&store, topic(&second.id, "Second A", 1, 1)).unwrap();
    add_topic(&store, topic(&first.id, "First B", 2, 1)).unwrap();
    add_topic(&store, topic(&first.id, "First A", 1, 1)).unwrap();

    let titles: Vec<_> = list_topics(&store, &course.id)
        .unwrap()
        .into_iter()
        .map(|t| t.title)
        .collect();
    assert_eq!(titles, vec!["First A", "First B", "Second A"]);
    assert_eq!(catalog::get_topic(&store, "first-a").unwrap().ord, 1);
}

#[test]
fn slugs_work_wherever_ids_do() {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path()).unwrap();
    create_course(&store, NewCourse::titled("Rust")).unwrap();
    let module = add_module(&store, "rust", "Basics", 1).unwrap();
    add_topic(&store, topic(&module.id, "Ownership", 1, 10)).unwrap();
    add_topic(&store, topic(&module.id, "Borrowing", 2, 5)).unwrap();

    assert_eq!(list_modules(&store, "rust").unwrap().len(), 1);
    assert_eq!(list_topics(&store, "rust").unwrap().len(), 2);
    assert!(publish_course(&store, "rust").unwrap().is_published);

    let updated = update_topic(
        &store,
        "ownership",
        TopicUpdate {
            estimated_duration_minutes: Some(99),
            ..TopicUpdate::default()
        },
    )
    .unwrap();
    assert_eq!(updated.estimated_duration_minutes, 99);
    assert_eq!(duration(&store, "rust"), 104);

    delete_topic(&store, "borrowing").unwrap();
    assert_eq!(duration(&store, "rust"), 99);
    assert_eq!(catalog::get_topic(&store, "borrowing").unwrap_err().kind(), "not_found");
    assert_eq!(list_topics(&store, "rust").unwrap().len(), 1);
    assert_eq!(list_topics(&store, "missing").unwrap_err().kind(), "not_found");
}
