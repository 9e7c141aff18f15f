use learnstate::core::store::Store;
use learnstate::plugins::catalog::{self, NewCourse};
use learnstate::plugins::reviews::{add_review, delete_review, list_reviews, update_review};
use learnstate::plugins::users;
use tempfile::tempdir;

fn setup() -> (tempfile::TempDir, Store, String) {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path()).unwrap();
    let course = catalog::create_course(&store, NewCourse::titled("Rust")).unwrap();
    (tmp, store, course.id)
}

fn learner(store: &Store, n: usize) -> String {
    users::create_user(store, &format!("learner{}@example.com", n), "")
        .unwrap()
        .id
}

fn rating(store: &Store, course_id: &str) -> (f64, i64) {
    let c = catalog::get_course(store, course_id).unwrap();
    (c.average_rating, c.total_reviews)
}

#[test]
fn two_reviews_then_delete_one() {
    let (_tmp, store, course) = setup();
    let five = add_review(&store, &learner(&store, 1), &course, 5, Some("great")).unwrap();
    add_review(&store, &learner(&store, 2), &course, 3, None).unwrap();
    assert_eq!(rating(&store, &course), (4.0, 2));

    delete_review(&store, &five.id).unwrap();
    assert_eq!(rating(&store, &course), (3.0, 1));
}

#[test]
fn average_tracks_every_addition_and_deletion() {
    let (_tmp, store, course) = setup();
    let ratings = [1, 4, 4, 5, 2, 3];
    let mut ids = Vec::new();
    for (n, r) in ratings.iter().enumerate() {
        ids.push(add_review(&store, &learner(&store, n), &course, *r, None).unwrap().id);
        let seen = &ratings[..=n];
        let mean = seen.iter().sum::<i64>() as f64 / seen.len() as f64;
        let (avg, count) = rating(&store, &course);
        assert!((avg - mean).abs() < 1e-9, "after {} reviews: {} != {}", n + 1, avg, mean);
        assert_eq!(count, seen.len() as i64);
    }

    for id in ids {
        delete_review(&store, &id).unwrap();
    }
    assert_eq!(rating(&store, &course), (0.0, 0));
}

#[test]
fn rating_change_recomputes_average() {
    let (_tmp, store, course) = setup();
    let review = add_review(&store, &learner(&store, 1), &course, 2, None).unwrap();
    add_review(&store, &learner(&store, 2), &course, 4, None).unwrap();

    let updated = update_review(&store, &review.id, Some(4), None).unwrap();
    assert_eq!(updated.rating, 4);
    assert_eq!(rating(&store, &course), (4.0, 2));

    let commented = update_review(&store, &review.id, None, Some("changed my mind")).unwrap();
    assert_eq!(commented.comment.as_deref(), Some("changed my mind"));
    assert_eq!(commented.rating, 4);
    assert_eq!(rating(&store, &course), (4.0, 2));
}

#[test]
fn invalid_reviews_are_rejected_without_touching_aggregate() {
    let (_tmp, store, course) = setup();
    let user = learner(&store, 1);
    assert_eq!(add_review(&store, &user, &course, 0, None).unwrap_err().kind(), "validation");
    assert_eq!(add_review(&store, &user, &course, 6, None).unwrap_err().kind(), "validation");

    let review = add_review(&store, &user, &course, 5, None).unwrap();
    assert_eq!(add_review(&store, &user, &course, 1, None).unwrap_err().kind(), "conflict");
    assert_eq!(
        update_review(&store, &review.id, Some(9), None).unwrap_err().kind(),
        "validation"
    );
    assert_eq!(rating(&store, &course), (5.0, 1));
    assert_eq!(list_reviews(&store, &course).unwrap().len(), 1);
    assert_eq!(delete_review(&store, "missing").unwrap_err().kind(), "not_found");
}
