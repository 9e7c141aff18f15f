use learnstate::core::store::Store;
use learnstate::plugins::catalog::{self, NewCourse, NewTopic};
use learnstate::plugins::enrollment;
use learnstate::plugins::progress;
use learnstate::plugins::quiz::{
    AnswerInput, QuestionType, add_choice, add_question, get_quiz, list_attempts, set_quiz,
    submit_attempt,
};
use learnstate::plugins::reconcile;
use learnstate::plugins::users;
use tempfile::tempdir;

struct QuizFixture {
    _tmp: tempfile::TempDir,
    store: Store,
    course: String,
    topic: String,
    other_topic: String,
    user: String,
    /// Single choice, 1 point: (question, correct, wrong).
    single: (String, String, String),
    /// Multiple choice, 2 points: (question, correct a, correct b, wrong).
    multi: (String, String, String, String),
}

fn quiz_fixture() -> QuizFixture {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path()).unwrap();
    let course = catalog::create_course(&store, NewCourse::titled("Rust")).unwrap().id;
    let module = catalog::add_module(&store, &course, "Basics", 1).unwrap().id;
    let mut topics = (1..=2).map(|ord| {
        catalog::add_topic(
            &store,
            NewTopic {
                module_id: module.clone(),
                title: format!("Topic {}", ord),
                estimated_duration_minutes: 10,
                ord,
                is_previewable: false,
            },
        )
        .unwrap()
        .id
    });
    let topic = topics.next().unwrap();
    let other_topic = topics.next().unwrap();

    set_quiz(&store, &topic, 70.0).unwrap();
    let q1 = add_question(&store, &topic, "Who owns it?", QuestionType::SingleChoice, 1, 1)
        .unwrap()
        .id;
    let q1_right = add_choice(&store, &q1, "The binding", true, 1).unwrap().id;
    let q1_wrong = add_choice(&store, &q1, "The heap", false, 2).unwrap().id;

    let q2 = add_question(&store, &topic, "Which are Copy?", QuestionType::MultipleChoice, 2, 2)
        .unwrap()
        .id;
    let q2_a = add_choice(&store, &q2, "u8", true, 1).unwrap().id;
    let q2_b = add_choice(&store, &q2, "bool", true, 2).unwrap().id;
    let q2_wrong = add_choice(&store, &q2, "String", false, 3).unwrap().id;

    let user = users::create_user(&store, "ada@example.com", "Ada").unwrap().id;
    enrollment::enroll(&store, &user, &course).unwrap();

    QuizFixture {
        _tmp: tmp,
        store,
        course,
        topic,
        other_topic,
        user,
        single: (q1, q1_right, q1_wrong),
        multi: (q2, q2_a, q2_b, q2_wrong),
    }
}

#[test]
fn quiz_detail_lists_questions_and_choices_in_order() {
    let f = quiz_fixture();
    let detail = get_quiz(&f.store, &f.topic).unwrap();
    assert_eq!(detail.quiz.pass_mark_percentage, 70.0);
    assert_eq!(detail.questions.len(), 2);
    assert_eq!(detail.questions[0].question.id, f.single.0);
    assert_eq!(detail.questions[1].choices.len(), 3);
    assert_eq!(detail.questions[1].question.question_type, QuestionType::MultipleChoice);
    assert_eq!(get_quiz(&f.store, &f.other_topic).unwrap_err().kind(), "not_found");
}

#[test]
fn all_correct_attempt_scores_full_and_completes_topic() {
    let f = quiz_fixture();
    let result = submit_attempt(
        &f.store,
        &f.user,
        &f.topic,
        &[
            AnswerInput::new(&f.single.0, &[&f.single.1]),
            AnswerInput::new(&f.multi.0, &[&f.multi.2, &f.multi.1]),
        ],
    )
    .unwrap();

    assert_eq!(result.attempt.score, 100.0);
    assert_eq!(result.attempt.correct_answers, 2);
    assert_eq!(result.attempt.total_questions_in_topic, 2);
    assert_eq!(result.attempt.max_points, 3);
    assert_eq!(result.attempt.pass_mark_percentage, 70.0);
    assert_eq!(result.attempt.points_awarded, 3);
    assert!(result.attempt.passed);
    assert!(result.attempt.topic_progress_id.is_some());

    let progress = result.progress.expect("passing attempt returns progress");
    assert_eq!(progress.completed_topics_count, 1);
    assert_eq!(progress.progress_percentage, 50.0);

    let records = progress::list_topic_progress(&f.store, &f.user, &f.course).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(Some(records[0].id.clone()), result.attempt.topic_progress_id);
}

#[test]
fn partial_multiple_choice_selection_earns_nothing() {
    let f = quiz_fixture();
    let result = submit_attempt(
        &f.store,
        &f.user,
        &f.topic,
        &[
            AnswerInput::new(&f.single.0, &[&f.single.1]),
            AnswerInput::new(&f.multi.0, &[&f.multi.1]),
        ],
    )
    .unwrap();

    assert!(result.answers[0].is_correct);
    assert!(!result.answers[1].is_correct);
    assert_eq!(result.answers[1].points_awarded, 0);
    assert_eq!(result.attempt.points_awarded, 1);
    assert_eq!(result.attempt.correct_answers, 1);
    assert_eq!(result.attempt.score, 33.33);
    assert!(!result.attempt.passed);
    assert!(result.progress.is_none());
    assert!(result.attempt.topic_progress_id.is_none());

    let p = progress::get_progress(&f.store, &f.user, &f.course).unwrap();
    assert_eq!(p.completed_topics_count, 0);
}

#[test]
fn extra_wrong_choice_fails_the_question() {
    let f = quiz_fixture();
    let result = submit_attempt(
        &f.store,
        &f.user,
        &f.topic,
        &[AnswerInput::new(&f.multi.0, &[&f.multi.1, &f.multi.2, &f.multi.3])],
    )
    .unwrap();
    assert!(!result.answers[0].is_correct);
    assert_eq!(result.attempt.score, 0.0);
    assert_eq!(result.attempt.total_questions_in_topic, 2);
}

#[test]
fn unanswered_questions_count_against_score() {
    let f = quiz_fixture();
    let result = submit_attempt(
        &f.store,
        &f.user,
        &f.topic,
        &[AnswerInput::new(&f.multi.0, &[&f.multi.1, &f.multi.2])],
    )
    .unwrap();
    assert_eq!(result.attempt.points_awarded, 2);
    assert_eq!(result.attempt.score, 66.67);
    assert!(!result.attempt.passed);
}

#[test]
fn topic_with_quiz_requires_a_pass_before_completion() {
    let f = quiz_fixture();
    let err = progress::complete_topic(&f.store, &f.user, &f.topic).unwrap_err();
    assert_eq!(err.kind(), "validation");
    assert!(err.to_string().contains("must pass the quiz"));

    // Topics without a quiz complete directly.
    progress::complete_topic(&f.store, &f.user, &f.other_topic).unwrap();

    submit_attempt(
        &f.store,
        &f.user,
        &f.topic,
        &[
            AnswerInput::new(&f.single.0, &[&f.single.1]),
            AnswerInput::new(&f.multi.0, &[&f.multi.1, &f.multi.2]),
        ],
    )
    .unwrap();
    progress::uncomplete_topic(&f.store, &f.user, &f.topic).unwrap();
    let p = progress::complete_topic(&f.store, &f.user, &f.topic).unwrap();
    assert_eq!(p.progress_percentage, 100.0);
}

#[test]
fn malformed_answers_are_rejected_without_an_attempt() {
    let f = quiz_fixture();
    let cases = vec![
        vec![],
        vec![AnswerInput::new(&f.single.0, &[])],
        vec![AnswerInput::new(&f.single.0, &[&f.single.1, &f.single.2])],
        vec![AnswerInput::new(&f.single.0, &[&f.multi.1])],
        vec![
            AnswerInput::new(&f.single.0, &[&f.single.1]),
            AnswerInput::new(&f.single.0, &[&f.single.2]),
        ],
    ];
    for answers in cases {
        let err = submit_attempt(&f.store, &f.user, &f.topic, &answers).unwrap_err();
        assert_eq!(err.kind(), "validation", "answers {:?}", answers);
    }
    assert_eq!(
        submit_attempt(&f.store, &f.user, &f.topic, &[AnswerInput::new("nope", &["x"])])
            .unwrap_err()
            .kind(),
        "not_found"
    );
    assert!(list_attempts(&f.store, &f.user, &f.topic).unwrap().is_empty());
}

#[test]
fn question_from_another_topic_is_rejected() {
    let f = quiz_fixture();
    set_quiz(&f.store, &f.other_topic, 50.0).unwrap();
    let foreign = add_question(&f.store, &f.other_topic, "Elsewhere", QuestionType::SingleChoice, 1, 1)
        .unwrap()
        .id;
    let choice = add_choice(&f.store, &foreign, "yes", true, 1).unwrap().id;
    let err = submit_attempt(&f.store, &f.user, &f.topic, &[AnswerInput::new(&foreign, &[&choice])])
        .unwrap_err();
    assert_eq!(err.kind(), "validation");
}

#[test]
fn unenrolled_users_and_quizless_topics_cannot_submit() {
    let f = quiz_fixture();
    let stranger = users::create_user(&f.store, "bob@example.com", "Bob").unwrap().id;
    let answers = [AnswerInput::new(&f.single.0, &[&f.single.1])];
    assert_eq!(
        submit_attempt(&f.store, &stranger, &f.topic, &answers).unwrap_err().kind(),
        "validation"
    );
    assert_eq!(
        submit_attempt(&f.store, &f.user, &f.other_topic, &answers).unwrap_err().kind(),
        "not_found"
    );
}

#[test]
fn every_attempt_is_kept() {
    let f = quiz_fixture();
    let wrong = [AnswerInput::new(&f.single.0, &[&f.single.2])];
    submit_attempt(&f.store, &f.user, &f.topic, &wrong).unwrap();
    submit_attempt(&f.store, &f.user, &f.topic, &wrong).unwrap();
    let attempts = list_attempts(&f.store, &f.user, &f.topic).unwrap();
    assert_eq!(attempts.len(), 2);
    assert!(attempts.iter().all(|a| !a.passed && a.score == 0.0));
}

#[test]
fn authoring_validation() {
    let f = quiz_fixture();
    assert_eq!(set_quiz(&f.store, &f.topic, 120.0).unwrap_err().kind(), "validation");
    assert_eq!(
        add_question(&f.store, &f.topic, "neg", QuestionType::SingleChoice, 9, -1)
            .unwrap_err()
            .kind(),
        "validation"
    );
    assert_eq!(
        add_question(&f.store, &f.topic, "dup", QuestionType::SingleChoice, 1, 1)
            .unwrap_err()
            .kind(),
        "conflict"
    );
    let updated = set_quiz(&f.store, &f.topic, 50.0).unwrap();
    assert_eq!(updated.pass_mark_percentage, 50.0);
}

#[test]
fn quiz_edits_do_not_rescore_past_attempts() {
    let f = quiz_fixture();
    let passed = submit_attempt(
        &f.store,
        &f.user,
        &f.topic,
        &[
            AnswerInput::new(&f.single.0, &[&f.single.1]),
            AnswerInput::new(&f.multi.0, &[&f.multi.1, &f.multi.2]),
        ],
    )
    .unwrap()
    .attempt;

    let q3 = add_question(&f.store, &f.topic, "Is &mut unique?", QuestionType::SingleChoice, 3, 3)
        .unwrap()
        .id;
    add_choice(&f.store, &q3, "Yes", true, 1).unwrap();
    set_quiz(&f.store, &f.topic, 100.0).unwrap();

    let report = reconcile::reconcile_only(&f.store, "quiz_attempt.score").unwrap();
    assert_eq!((report.checked, report.drifted, report.stale), (1, 0, 0));
    let kept = &list_attempts(&f.store, &f.user, &f.topic).unwrap()[0];
    assert_eq!(kept, &passed);
    assert_eq!(
        progress::get_progress(&f.store, &f.user, &f.course).unwrap().progress_percentage,
        50.0
    );

    // A new attempt is scored against the quiz as it stands now.
    let later = submit_attempt(
        &f.store,
        &f.user,
        &f.topic,
        &[
            AnswerInput::new(&f.single.0, &[&f.single.1]),
            AnswerInput::new(&f.multi.0, &[&f.multi.1, &f.multi.2]),
        ],
    )
    .unwrap()
    .attempt;
    assert_eq!((later.total_questions_in_topic, later.max_points), (3, 6));
    assert_eq!(later.score, 50.0);
    assert!(!later.passed);
}
