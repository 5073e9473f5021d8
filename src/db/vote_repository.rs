use std::sync::Arc;

use bson::oid::ObjectId;
use bson::{doc, DateTime};

use crate::db::collection::Collection;
use crate::db::filter::{parse_id, VoteFilter};
use crate::db::loader::Loaders;
use crate::db::models::{User, Vote, VoteInput, VoteType, VoteUpdate};
use crate::db::query::{list, ListArgs};
use crate::error::AppError;
use crate::events::{ChangeAction, EventBus, Topic};
use crate::validation::{ensure, require, ValidationError, Violations};

pub const SORTABLE: &[&str] = &["createdAt"];

/// Up and down votes, at most one per user and node.
///
/// Uniqueness is a read-then-write check; with MongoDB the unique
/// `(userId, nodeId)` index rejects the loser of a race.
pub struct VoteRepository {
    collection: Arc<dyn Collection<Vote>>,
    loaders: Arc<Loaders>,
    events: EventBus,
}

impl VoteRepository {
    pub fn new(collection: Arc<dyn Collection<Vote>>, loaders: Arc<Loaders>, events: EventBus) -> Self {
        Self {
            collection,
            loaders,
            events,
        }
    }

    pub async fn create_vote(&self, input: VoteInput, actor: Option<&User>) -> Result<Vote, AppError> {
        let mut violations = Violations::new();
        violations.check(actor.is_none(), "user", "Authentication required.");

        let vote_type = VoteType::parse(&input.vote_type);
        violations.check(vote_type.is_none(), "type", "Invalid vote type.");

        let node = self.loaders.nodes.load(Some(input.node_id.as_str())).await?;
        violations.check(node.is_none(), "nodeId", "Node not found.");

        if let (Some(actor), Some(node)) = (actor, &node) {
            let existing = self
                .collection
                .count(doc! { "userId": actor.id, "nodeId": node.id })
                .await?;
            violations.check(existing > 0, "user", "User already voted");
        }

        if let Err(err) = violations.finish() {
            tracing::warn!(keys = ?err.keys().collect::<Vec<_>>(), "Rejected vote");
            return Err(err.into());
        }
        let (Some(actor), Some(vote_type), Some(node)) = (actor, vote_type, node) else {
            return Err(AppError::Internal("vote validation passed without required fields".into()));
        };

        let vote = Vote {
            id: ObjectId::new(),
            vote_type,
            node_id: node.id,
            user_id: actor.id,
            created_at: Some(DateTime::now()),
        };

        self.collection.insert_one(&vote).await?;
        self.loaders.votes.prime(&vote).await;
        self.events.publish(Topic::Vote, ChangeAction::Created, vote.id);
        tracing::info!(entity = "votes", id = %vote.id, node = %vote.node_id, "Vote created");

        Ok(vote)
    }

    async fn owned(&self, id: &str, actor: Option<&User>) -> Result<Vote, AppError> {
        let actor = require(actor, "user", "Authentication required.")?;
        let vote = require(
            self.loaders.votes.load(Some(id)).await?,
            "id",
            "Vote not found.",
        )?;
        ensure(vote.user_id == actor.id, "user", "Only the voter can change this vote.")?;
        Ok(vote)
    }

    pub async fn update_vote(
        &self,
        id: &str,
        input: VoteUpdate,
        actor: Option<&User>,
    ) -> Result<Vote, AppError> {
        let mut vote = self.owned(id, actor).await?;

        let vote_type = require(VoteType::parse(&input.vote_type), "type", "Invalid vote type.")?;
        if vote_type == vote.vote_type {
            return Err(ValidationError::single("input", "No changes to apply.").into());
        }

        vote.vote_type = vote_type;
        self.collection.replace_one(vote.id, &vote).await?;
        self.loaders.votes.prime(&vote).await;
        self.events.publish(Topic::Vote, ChangeAction::Updated, vote.id);
        tracing::info!(entity = "votes", id = %vote.id, "Vote updated");

        Ok(vote)
    }

    pub async fn delete_vote(&self, id: &str, actor: Option<&User>) -> Result<Vote, AppError> {
        let vote = self.owned(id, actor).await?;

        self.collection.delete_one(vote.id).await?;
        self.loaders.votes.forget(vote.id).await;
        self.events.publish(Topic::Vote, ChangeAction::Deleted, vote.id);
        tracing::info!(entity = "votes", id = %vote.id, "Vote deleted");

        Ok(vote)
    }

    pub async fn all_votes(
        &self,
        filter: Option<&VoteFilter>,
        order_by: Option<&str>,
        skip: Option<i64>,
        first: Option<i64>,
    ) -> Result<Vec<Vote>, AppError> {
        list(
            self.collection.as_ref(),
            filter,
            ListArgs::new(order_by, skip, first),
            SORTABLE,
        )
        .await
    }

    pub async fn get_vote_by_id(&self, id: Option<&str>) -> Result<Option<Vote>, AppError> {
        self.loaders.votes.load(id).await
    }

    /// Votes on `node_id`, optionally only of one type. Unknown nodes and
    /// types count zero.
    pub async fn vote_count(&self, node_id: &str, vote_type: Option<&str>) -> Result<u64, AppError> {
        let Some(node_id) = parse_id(node_id) else {
            return Ok(0);
        };
        let mut filter = doc! { "nodeId": node_id };
        if let Some(raw) = vote_type {
            let Some(vote_type) = VoteType::parse(raw) else {
                return Ok(0);
            };
            filter.insert("type", vote_type);
        }
        self.collection.count(filter).await
    }
}
