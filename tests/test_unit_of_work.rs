mod common;

use common::TestEnv;
use graphboard::db::models::NodeUpdate;
use graphboard::demo_seeder::{seed_demo_data, DEMO_EMAIL, DEMO_PASSWORD};

#[tokio::test]
async fn test_each_unit_of_work_sees_committed_writes() {
    let env = TestEnv::new();
    let author = env.user("Author", "author@test.com").await;
    let post = env.post(&author, "Before", "Body").await;
    let id = post.id.to_hex();

    let reader = env.uow();
    let cached = reader.nodes.get_node_by_id(Some(&id)).await.unwrap().unwrap();
    assert_eq!(cached.title.as_deref(), Some("Before"));

    env.uow()
        .nodes
        .update_node(
            &id,
            NodeUpdate {
                title: Some("After".into()),
                content: None,
            },
            Some(&author),
        )
        .await
        .unwrap();

    // The older unit of work keeps its snapshot; a new one does not.
    let stale = reader.nodes.get_node_by_id(Some(&id)).await.unwrap().unwrap();
    assert_eq!(stale.title.as_deref(), Some("Before"));
    let fresh = env.uow().nodes.get_node_by_id(Some(&id)).await.unwrap().unwrap();
    assert_eq!(fresh.title.as_deref(), Some("After"));
}

#[tokio::test]
async fn test_writes_are_visible_within_the_same_unit_of_work() {
    let env = TestEnv::new();
    let author = env.user("Author", "author@test.com").await;
    let uow = env.uow();
    let post = uow
        .nodes
        .create_node(common::post_input("Title", "Body"), Some(&author))
        .await
        .unwrap();

    // Warm the cache, then write through the same repositories.
    uow.nodes.get_node_by_id(Some(&post.id.to_hex())).await.unwrap();
    let comment = uow
        .nodes
        .create_node(common::comment_input(&post, "Reply"), Some(&author))
        .await
        .unwrap();

    let parent = uow
        .nodes
        .get_node_by_id(Some(&post.id.to_hex()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(parent.children, vec![comment.id]);
}

#[tokio::test]
async fn test_missing_and_malformed_ids_resolve_to_none() {
    let env = TestEnv::new();
    let uow = env.uow();

    assert!(uow.nodes.get_node_by_id(None).await.unwrap().is_none());
    assert!(uow.nodes.get_node_by_id(Some("xyz")).await.unwrap().is_none());
    assert!(uow
        .users
        .get_user_by_id(Some(&bson::oid::ObjectId::new().to_hex()))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_demo_seed_runs_once() {
    let env = TestEnv::new();

    assert!(seed_demo_data(&env.state).await.unwrap());
    assert!(!seed_demo_data(&env.state).await.unwrap());

    let uow = env.uow();
    let users = uow.users.all_users(None, None, None, None).await.unwrap();
    assert_eq!(users.len(), 1);

    let nodes = uow.nodes.all_nodes(None, None, None, None).await.unwrap();
    assert_eq!(nodes.len(), 4);
    assert_eq!(uow.votes.all_votes(None, None, None, None).await.unwrap().len(), 1);

    let signed_in = env
        .state
        .auth
        .authenticate_user(DEMO_PASSWORD, DEMO_EMAIL, &uow.users)
        .await
        .unwrap();
    assert!(signed_in.is_some());
}
