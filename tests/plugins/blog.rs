use learnstate::core::store::Store;
use learnstate::plugins::blog::{
    BlogCommenter, BlogStatus, NewBlogPost, add_blog_comment, create_blog_post, get_blog_post,
    make_excerpt, set_blog_status, set_comment_approval,
};
use learnstate::plugins::users;
use tempfile::tempdir;

fn draft(title: &str, content_html: &str) -> NewBlogPost {
    NewBlogPost {
        title: title.to_string(),
        content_html: content_html.to_string(),
        ..NewBlogPost::default()
    }
}

#[test]
fn excerpt_is_generated_from_content() {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path()).unwrap();
    let long = format!("<p>{}</p>", "word ".repeat(200));
    let post = create_blog_post(&store, draft("Release notes", &long)).unwrap();
    assert_eq!(post.excerpt, make_excerpt(&long));
    assert_eq!(post.excerpt.chars().count(), 300);
    assert!(post.excerpt.ends_with("..."));
    assert!(!post.excerpt.contains('<'));

    let given = NewBlogPost {
        excerpt: "Hand written".to_string(),
        ..draft("Notes", "<p>body</p>")
    };
    assert_eq!(create_blog_post(&store, given).unwrap().excerpt, "Hand written");
}

#[test]
fn publish_date_is_stamped_once() {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path()).unwrap();
    let post = create_blog_post(&store, draft("Hello", "<p>hi</p>")).unwrap();
    assert_eq!(post.status, BlogStatus::Draft);
    assert_eq!(post.publish_date, None);

    let published = set_blog_status(&store, &post.id, BlogStatus::Published).unwrap();
    let stamped = published.publish_date.expect("published post has a date");

    let archived = set_blog_status(&store, &post.id, BlogStatus::Archived).unwrap();
    assert_eq!(archived.publish_date, Some(stamped));
    let again = set_blog_status(&store, "hello", BlogStatus::Published).unwrap();
    assert_eq!(again.publish_date, Some(stamped));

    let direct = NewBlogPost {
        status: BlogStatus::Published,
        ..draft("Hello", "")
    };
    let direct = create_blog_post(&store, direct).unwrap();
    assert_eq!(direct.slug, "hello-1");
    assert!(direct.publish_date.is_some());
}

#[test]
fn comment_count_only_includes_approved_comments() {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path()).unwrap();
    let user = users::create_user(&store, "ada@example.com", "Ada Lovelace").unwrap();
    let post = create_blog_post(&store, draft("Hello", "<p>hi</p>")).unwrap();

    let by_user =
        add_blog_comment(&store, &post.id, BlogCommenter::User(user.id.clone()), "great", None)
            .unwrap();
    assert_eq!(by_user.author_name, "Ada Lovelace");
    let by_guest = add_blog_comment(
        &store,
        &post.id,
        BlogCommenter::Guest("Grace".to_string()),
        "thanks",
        Some(&by_user.id),
    )
    .unwrap();
    assert_eq!(by_guest.author_id, None);
    assert_eq!(get_blog_post(&store, &post.id).unwrap().comment_count, 2);

    let hidden = set_comment_approval(&store, &by_guest.id, false).unwrap();
    assert!(!hidden.is_approved);
    assert_eq!(get_blog_post(&store, &post.slug).unwrap().comment_count, 1);

    set_comment_approval(&store, &by_guest.id, true).unwrap();
    assert_eq!(get_blog_post(&store, &post.id).unwrap().comment_count, 2);
}

#[test]
fn commenter_name_falls_back_to_email() {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path()).unwrap();
    let user = users::create_user(&store, "anon@example.com", "").unwrap();
    let post = create_blog_post(&store, draft("Hello", "")).unwrap();
    let comment =
        add_blog_comment(&store, &post.id, BlogCommenter::User(user.id), "hi", None).unwrap();
    assert_eq!(comment.author_name, "anon@example.com");
}

#[test]
fn invalid_comments_are_rejected() {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path()).unwrap();
    let post = create_blog_post(&store, draft("Hello", "")).unwrap();
    let other = create_blog_post(&store, draft("Other", "")).unwrap();
    let guest = || BlogCommenter::Guest("Grace".to_string());

    assert_eq!(
        add_blog_comment(&store, &post.id, guest(), "   ", None).unwrap_err().kind(),
        "validation"
    );
    assert_eq!(
        add_blog_comment(&store, &post.id, BlogCommenter::Guest(" ".to_string()), "hi", None)
            .unwrap_err()
            .kind(),
        "validation"
    );
    let foreign = add_blog_comment(&store, &other.id, guest(), "hi", None).unwrap();
    assert_eq!(
        add_blog_comment(&store, &post.id, guest(), "hi", Some(&foreign.id))
            .unwrap_err()
            .kind(),
        "validation"
    );
    assert_eq!(set_comment_approval(&store, "missing", true).unwrap_err().kind(), "not_found");
    assert_eq!(get_blog_post(&store, &post.id).unwrap().comment_count, 0);
}
