mod common;

use std::time::Duration;

use common::{ids, TestEnv};
use graphboard::db::filter::NodeFilter;
use graphboard::db::models::UserInput;

#[tokio::test]
async fn test_parent_filter_end_to_end() {
    let env = TestEnv::new();
    let user = env
        .uow()
        .users
        .create_user(UserInput {
            username: "Test User".into(),
            email: "test@test.com".into(),
            password: "Secret123".into(),
        })
        .await
        .unwrap();

    let parent = env.post(&user, "T", "C").await;
    let child = env.comment(&user, &parent, "child").await;
    let nodes = env.uow().nodes;

    let by_parent = nodes
        .all_nodes(
            Some(&NodeFilter::by_parent(Some(&parent.id.to_hex()))),
            None,
            None,
            None,
        )
        .await
        .unwrap();
    assert_eq!(ids(&by_parent), vec![child.id]);

    let by_child = nodes
        .all_nodes(
            Some(&NodeFilter::by_parent(Some(&child.id.to_hex()))),
            None,
            None,
            None,
        )
        .await
        .unwrap();
    assert!(by_child.is_empty());

    let roots = nodes
        .all_nodes(Some(&NodeFilter::by_parent(None)), None, None, None)
        .await
        .unwrap();
    assert!(ids(&roots).contains(&parent.id));
    assert!(!ids(&roots).contains(&child.id));
}

#[tokio::test]
async fn test_paging_over_created_order() {
    let env = TestEnv::new();
    let user = env.user("Pager", "pager@test.com").await;
    let a = env.post(&user, "A", "a").await;
    let b = env.post(&user, "B", "b").await;
    let c = env.post(&user, "C", "c").await;
    let nodes = env.uow().nodes;

    let page = nodes
        .all_nodes(None, Some("createdAt_ASC"), Some(1), Some(2))
        .await
        .unwrap();
    assert_eq!(ids(&page), vec![b.id, c.id]);

    let all = nodes
        .all_nodes(None, Some("createdAt_ASC"), None, None)
        .await
        .unwrap();
    assert_eq!(ids(&all), vec![a.id, b.id, c.id]);

    let none = nodes
        .all_nodes(None, Some("createdAt_ASC"), None, Some(0))
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_same_millisecond_ties_follow_creation_order() {
    let env = TestEnv::new();
    let user = env.user("Pager", "pager@test.com").await;
    let uow = env.uow();
    let mut created = Vec::new();
    for title in ["A", "B", "C"] {
        let node = uow
            .nodes
            .create_node(common::post_input(title, "body"), Some(&user))
            .await
            .unwrap();
        created.push(node.id);
    }

    let descending = uow
        .nodes
        .all_nodes(None, Some("createdAt_DESC"), None, None)
        .await
        .unwrap();
    let mut expected = created.clone();
    expected.reverse();
    assert_eq!(ids(&descending), expected);

    let page = uow
        .nodes
        .all_nodes(None, Some("createdAt_DESC"), Some(1), Some(1))
        .await
        .unwrap();
    assert_eq!(ids(&page), vec![created[1]]);

    let ascending = uow
        .nodes
        .all_nodes(None, Some("createdAt_ASC"), None, None)
        .await
        .unwrap();
    assert_eq!(ids(&ascending), created);
}

#[tokio::test]
async fn test_invalid_paging_arguments() {
    let env = TestEnv::new();
    let nodes = env.uow().nodes;

    let err = nodes
        .all_nodes(None, None, Some(-1), None)
        .await
        .unwrap_err();
    assert!(err.as_validation().unwrap().has_key("skip"));

    let err = nodes
        .all_nodes(None, None, None, Some(-5))
        .await
        .unwrap_err();
    assert!(err.as_validation().unwrap().has_key("first"));
}

#[tokio::test]
async fn test_filter_from_json() {
    let env = TestEnv::new();
    let user = env.user("Searcher", "searcher@test.com").await;
    let rust = env.post(&user, "Rust tips", "ownership").await;
    let go = env.post(&user, "Go tips", "goroutines").await;
    let other = env.post(&user, "Cooking", "pasta").await;
    let nodes = env.uow().nodes;

    let filter: NodeFilter = serde_json::from_value(serde_json::json!({
        "OR": [
            { "title_contains": "Rust" },
            { "content_contains": "goroutine" }
        ]
    }))
    .unwrap();
    let found = nodes
        .all_nodes(Some(&filter), Some("createdAt_ASC"), None, None)
        .await
        .unwrap();
    assert_eq!(ids(&found), vec![rust.id, go.id]);

    let filter: NodeFilter = serde_json::from_value(serde_json::json!({
        "relationType": "POST",
        "createdBy": user.id.to_hex(),
        "title_contains": "Cook"
    }))
    .unwrap();
    let found = nodes.all_nodes(Some(&filter), None, None, None).await.unwrap();
    assert_eq!(ids(&found), vec![other.id]);

    let filter: NodeFilter = serde_json::from_value(serde_json::json!({
        "dataType": "NOT_A_TYPE"
    }))
    .unwrap();
    let found = nodes.all_nodes(Some(&filter), None, None, None).await.unwrap();
    assert!(found.is_empty());
}

#[tokio::test]
async fn test_children_contains() {
    let env = TestEnv::new();
    let user = env.user("Threader", "threader@test.com").await;
    let post = env.post(&user, "Thread", "root").await;
    let lonely = env.post(&user, "Lonely", "root").await;
    let first = env.comment(&user, &post, "one").await;
    let second = env.comment(&user, &post, "two").await;
    let nodes = env.uow().nodes;

    let filter: NodeFilter = serde_json::from_value(serde_json::json!({
        "children_contains": [first.id.to_hex(), second.id.to_hex()]
    }))
    .unwrap();
    let found = nodes.all_nodes(Some(&filter), None, None, None).await.unwrap();
    assert_eq!(ids(&found), vec![post.id]);

    let filter: NodeFilter = serde_json::from_value(serde_json::json!({
        "children_contains": null,
        "relationType": "POST"
    }))
    .unwrap();
    let found = nodes
        .all_nodes(Some(&filter), Some("createdAt_ASC"), None, None)
        .await
        .unwrap();
    assert_eq!(ids(&found), vec![post.id, lonely.id]);
}

#[tokio::test]
async fn test_sort_descending_and_unsortable_field() {
    let env = TestEnv::new();
    let user = env.user("Sorter", "sorter@test.com").await;
    let a = env.post(&user, "A", "a").await;
    let b = env.post(&user, "B", "b").await;
    let nodes = env.uow().nodes;

    // Bump `a` so its updatedAt is strictly the latest.
    tokio::time::sleep(Duration::from_millis(5)).await;
    nodes
        .update_node(
            &a.id.to_hex(),
            graphboard::db::models::NodeUpdate {
                title: Some("A2".into()),
                content: None,
            },
            Some(&user),
        )
        .await
        .unwrap();

    let found = nodes
        .all_nodes(None, Some("updatedAt_DESC"), None, None)
        .await
        .unwrap();
    assert_eq!(ids(&found)[0], a.id);
    assert!(ids(&found).contains(&b.id));

    // Unsortable fields keep the natural order.
    let natural = nodes
        .all_nodes(None, Some("title_ASC"), None, None)
        .await
        .unwrap();
    assert_eq!(ids(&natural), vec![a.id, b.id]);
}
