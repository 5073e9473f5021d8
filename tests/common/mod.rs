#![allow(dead_code)]

use std::sync::Arc;

use graphboard::auth::password::{BcryptHasher, MIN_COST};
use graphboard::config::AppConfig;
use graphboard::db::collection::Collections;
use graphboard::db::models::{Node, NodeInput, User, UserInput};
use graphboard::state::{AppState, UnitOfWork};

/// In-process environment: in-memory collections, fast bcrypt.
pub struct TestEnv {
    pub state: AppState,
}

impl TestEnv {
    pub fn new() -> Self {
        let config = AppConfig {
            jwt_secret: "test-secret".into(),
            bcrypt_cost: MIN_COST,
            ..AppConfig::default()
        };
        Self::with_collections(config, Collections::in_memory())
    }

    pub fn with_collections(config: AppConfig, collections: Collections) -> Self {
        let hasher = Arc::new(BcryptHasher::new(config.bcrypt_cost));
        Self {
            state: AppState::with_hasher(config, collections, hasher),
        }
    }

    /// A fresh unit of work (new loader caches).
    pub fn uow(&self) -> UnitOfWork {
        self.state.unit_of_work()
    }

    pub async fn user(&self, username: &str, email: &str) -> User {
        self.uow()
            .users
            .create_user(UserInput {
                username: username.into(),
                email: email.into(),
                password: "Secret123".into(),
            })
            .await
            .expect("Failed to create user")
    }

    pub async fn post(&self, author: &User, title: &str, content: &str) -> Node {
        self.uow()
            .nodes
            .create_node(post_input(title, content), Some(author))
            .await
            .expect("Failed to create post")
    }

    pub async fn comment(&self, author: &User, parent: &Node, content: &str) -> Node {
        self.uow()
            .nodes
            .create_node(comment_input(parent, content), Some(author))
            .await
            .expect("Failed to create comment")
    }
}

pub fn post_input(title: &str, content: &str) -> NodeInput {
    NodeInput {
        data_type: "TEXT".into(),
        relation_type: "POST".into(),
        title: Some(title.into()),
        content: Some(content.into()),
        parent_id: None,
    }
}

pub fn comment_input(parent: &Node, content: &str) -> NodeInput {
    NodeInput {
        data_type: "TEXT".into(),
        relation_type: "COMMENT".into(),
        title: None,
        content: Some(content.into()),
        parent_id: Some(parent.id.to_hex()),
    }
}

pub fn ids(nodes: &[Node]) -> Vec<bson::oid::ObjectId> {
    nodes.iter().map(|n| n.id).collect()
}
