use crate::db::models::{NodeInput, UserInput, VoteInput};
use crate::error::AppError;
use crate::state::AppState;

pub const DEMO_EMAIL: &str = "demo@graphboard.dev";
pub const DEMO_PASSWORD: &str = "Demo12345";

/// Seed a demo account, two posts, a comment thread and a vote.
///
/// Does nothing when the demo account already exists. Returns whether
/// anything was written.
pub async fn seed_demo_data(state: &AppState) -> Result<bool, AppError> {
    tracing::info!("Starting demo data seeding...");
    let uow = state.unit_of_work();

    if uow.users.find_by_email(DEMO_EMAIL).await?.is_some() {
        tracing::info!("Demo account '{}' already exists, skipping.", DEMO_EMAIL);
        return Ok(false);
    }

    let demo = uow
        .users
        .create_user(UserInput {
            username: "Demo User".into(),
            email: DEMO_EMAIL.into(),
            password: DEMO_PASSWORD.into(),
        })
        .await?;

    let welcome = uow
        .nodes
        .create_node(
            NodeInput {
                data_type: "TEXT".into(),
                relation_type: "POST".into(),
                title: Some("Welcome to Graphboard".into()),
                content: Some("Posts, comments, links and votes in one graph.".into()),
                parent_id: None,
            },
            Some(&demo),
        )
        .await?;

    uow.nodes
        .create_node(
            NodeInput {
                data_type: "URL".into(),
                relation_type: "POST".into(),
                title: Some("The Rust Programming Language".into()),
                content: Some("https://doc.rust-lang.org/book/".into()),
                parent_id: None,
            },
            Some(&demo),
        )
        .await?;

    let comment = uow
        .nodes
        .create_node(
            NodeInput {
                data_type: "TEXT".into(),
                relation_type: "COMMENT".into(),
                title: None,
                content: Some("First!".into()),
                parent_id: Some(welcome.id.to_hex()),
            },
            Some(&demo),
        )
        .await?;

    uow.nodes
        .create_node(
            NodeInput {
                data_type: "TEXT".into(),
                relation_type: "COMMENT".into(),
                title: None,
                content: Some("Replies nest under comments too.".into()),
                parent_id: Some(comment.id.to_hex()),
            },
            Some(&demo),
        )
        .await?;

    uow.votes
        .create_vote(
            VoteInput {
                vote_type: "UP".into(),
                node_id: welcome.id.to_hex(),
            },
            Some(&demo),
        )
        .await?;

    tracing::info!("Demo data seeding completed.");
    Ok(true)
}
