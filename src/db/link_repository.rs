use std::sync::Arc;

use bson::oid::ObjectId;
use bson::DateTime;

use crate::db::collection::Collection;
use crate::db::filter::LinkFilter;
use crate::db::loader::Loaders;
use crate::db::models::{Link, LinkInput, LinkType, LinkUpdate, User};
use crate::db::query::{list, ListArgs};
use crate::error::AppError;
use crate::events::{ChangeAction, EventBus, Topic};
use crate::validation::{ensure, require, ValidationError, Violations};

pub const SORTABLE: &[&str] = &["createdAt"];

/// Typed edges between nodes. Links are removed outright on delete.
pub struct LinkRepository {
    collection: Arc<dyn Collection<Link>>,
    loaders: Arc<Loaders>,
    events: EventBus,
}

impl LinkRepository {
    pub fn new(collection: Arc<dyn Collection<Link>>, loaders: Arc<Loaders>, events: EventBus) -> Self {
        Self {
            collection,
            loaders,
            events,
        }
    }

    pub async fn create_link(&self, input: LinkInput, actor: Option<&User>) -> Result<Link, AppError> {
        let mut violations = Violations::new();
        violations.check(actor.is_none(), "createdBy", "Authentication required.");

        let link_type = LinkType::parse(&input.link_type);
        violations.check(link_type.is_none(), "type", "Invalid link type.");

        // Issued together so both ids land in one loader batch.
        let (source, dest) = tokio::join!(
            self.loaders.nodes.load(Some(input.source_node_id.as_str())),
            self.loaders.nodes.load(Some(input.dest_node_id.as_str())),
        );
        let (source, dest) = (source?, dest?);
        violations.check(source.is_none(), "sourceNodeId", "Source node not found.");

        match &dest {
            None => violations.push("destNodeId", "Destination node not found."),
            Some(dest) => violations.check(
                actor.is_some_and(|a| dest.created_by_id != Some(a.id)),
                "destNodeId",
                "Destination node must be your own.",
            ),
        }

        if let Err(err) = violations.finish() {
            tracing::warn!(keys = ?err.keys().collect::<Vec<_>>(), "Rejected link creation");
            return Err(err.into());
        }
        let (Some(actor), Some(link_type), Some(source), Some(dest)) = (actor, link_type, source, dest)
        else {
            return Err(AppError::Internal("link validation passed without required fields".into()));
        };

        let link = Link {
            id: ObjectId::new(),
            link_type,
            source_node_id: source.id,
            dest_node_id: dest.id,
            created_by_id: Some(actor.id),
            created_at: Some(DateTime::now()),
        };

        self.collection.insert_one(&link).await?;
        self.loaders.links.prime(&link).await;
        self.events.publish(Topic::Link, ChangeAction::Created, link.id);
        tracing::info!(entity = "links", id = %link.id, "Link created");

        Ok(link)
    }

    async fn owned(&self, id: &str, actor: Option<&User>) -> Result<Link, AppError> {
        let actor = require(actor, "user", "Authentication required.")?;
        let link = require(
            self.loaders.links.load(Some(id)).await?,
            "id",
            "Link not found.",
        )?;
        ensure(
            link.created_by_id == Some(actor.id),
            "user",
            "Only the creator can modify this link.",
        )?;
        Ok(link)
    }

    pub async fn update_link(
        &self,
        id: &str,
        input: LinkUpdate,
        actor: Option<&User>,
    ) -> Result<Link, AppError> {
        let mut link = self.owned(id, actor).await?;

        let link_type = require(LinkType::parse(&input.link_type), "type", "Invalid link type.")?;
        if link_type == link.link_type {
            return Err(ValidationError::single("input", "No changes to apply.").into());
        }

        link.link_type = link_type;
        self.collection.replace_one(link.id, &link).await?;
        self.loaders.links.prime(&link).await;
        self.events.publish(Topic::Link, ChangeAction::Updated, link.id);
        tracing::info!(entity = "links", id = %link.id, "Link updated");

        Ok(link)
    }

    /// Remove the link and return it as it was.
    pub async fn delete_link(&self, id: &str, actor: Option<&User>) -> Result<Link, AppError> {
        let link = self.owned(id, actor).await?;

        self.collection.delete_one(link.id).await?;
        self.loaders.links.forget(link.id).await;
        self.events.publish(Topic::Link, ChangeAction::Deleted, link.id);
        tracing::info!(entity = "links", id = %link.id, "Link deleted");

        Ok(link)
    }

    pub async fn all_links(
        &self,
        filter: Option<&LinkFilter>,
        order_by: Option<&str>,
        skip: Option<i64>,
        first: Option<i64>,
    ) -> Result<Vec<Link>, AppError> {
        list(
            self.collection.as_ref(),
            filter,
            ListArgs::new(order_by, skip, first),
            SORTABLE,
        )
        .await
    }

    pub async fn get_link_by_id(&self, id: Option<&str>) -> Result<Option<Link>, AppError> {
        self.loaders.links.load(id).await
    }
}
