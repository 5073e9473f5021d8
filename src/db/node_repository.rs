use std::sync::Arc;

use bson::oid::ObjectId;
use bson::{Bson, DateTime};

use crate::db::collection::Collection;
use crate::db::filter::NodeFilter;
use crate::db::loader::Loaders;
use crate::db::models::{
    update_timestamp, DataType, Node, NodeInput, NodeUpdate, RelationType, User,
};
use crate::db::query::{list, ListArgs};
use crate::error::AppError;
use crate::events::{ChangeAction, EventBus, Topic};
use crate::validation::{
    ensure, is_blank, is_valid_url, require, ValidationError, Violations,
};

pub const SORTABLE: &[&str] = &["createdAt", "updatedAt"];

/// Create, update, soft-delete and query content nodes.
pub struct NodeRepository {
    collection: Arc<dyn Collection<Node>>,
    loaders: Arc<Loaders>,
    events: EventBus,
}

fn normalized(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Field checks for content that depend on the node's data type.
fn check_content(violations: &mut Violations, data_type: Option<DataType>, content: Option<&str>) {
    if is_blank(content) {
        violations.push("content", "Content is required.");
    } else if data_type == Some(DataType::Url) && !content.is_some_and(is_valid_url) {
        violations.push("content", "Content must be a valid URL.");
    }
}

impl NodeRepository {
    pub fn new(collection: Arc<dyn Collection<Node>>, loaders: Arc<Loaders>, events: EventBus) -> Self {
        Self {
            collection,
            loaders,
            events,
        }
    }

    pub async fn create_node(&self, input: NodeInput, actor: Option<&User>) -> Result<Node, AppError> {
        let mut violations = Violations::new();
        violations.check(actor.is_none(), "createdBy", "Authentication required.");

        let data_type = DataType::parse(&input.data_type).filter(|t| *t != DataType::Deleted);
        violations.check(data_type.is_none(), "dataType", "Invalid data type.");

        let relation_type = RelationType::parse(&input.relation_type);
        violations.check(relation_type.is_none(), "relationType", "Invalid relation type.");

        violations.check(
            relation_type == Some(RelationType::Post) && is_blank(input.title.as_deref()),
            "title",
            "Title is required.",
        );
        check_content(&mut violations, data_type, input.content.as_deref());

        let mut parent = None;
        if relation_type == Some(RelationType::Comment) {
            if is_blank(input.parent_id.as_deref()) {
                violations.push("parentId", "Parent is required.");
            } else {
                parent = self.loaders.nodes.load(input.parent_id.as_deref()).await?;
                violations.check(parent.is_none(), "parentId", "Parent node not found.");
            }
        }

        if let Err(err) = violations.finish() {
            tracing::warn!(keys = ?err.keys().collect::<Vec<_>>(), "Rejected node creation");
            return Err(err.into());
        }
        let (Some(actor), Some(data_type), Some(relation_type)) = (actor, data_type, relation_type)
        else {
            return Err(AppError::Internal("node validation passed without required fields".into()));
        };

        let now = DateTime::now();
        let node = Node {
            id: ObjectId::new(),
            data_type,
            relation_type,
            title: normalized(input.title),
            content: input.content,
            parent_id: parent.as_ref().map(|p| p.id),
            children: Vec::new(),
            created_by_id: Some(actor.id),
            updated_by_id: Some(actor.id),
            created_at: Some(now),
            updated_at: Some(now),
        };

        self.collection.insert_one(&node).await?;

        if let Some(mut parent) = parent {
            if let Err(err) = self
                .collection
                .add_to_set(parent.id, "children", Bson::ObjectId(node.id))
                .await
            {
                tracing::error!(id = %node.id, parent = %parent.id, error = %err, "Failed to attach comment; removing it");
                if let Err(cleanup) = self.collection.delete_one(node.id).await {
                    tracing::error!(id = %node.id, error = %cleanup, "Failed to remove unattached comment");
                }
                return Err(err);
            }
            if !parent.children.contains(&node.id) {
                parent.children.push(node.id);
            }
            self.loaders.nodes.prime(&parent).await;
        }

        self.loaders.nodes.prime(&node).await;
        self.events.publish(Topic::Node, ChangeAction::Created, node.id);
        tracing::info!(entity = "nodes", id = %node.id, "Node created");

        Ok(node)
    }

    /// The node `id` if `actor` may modify it.
    async fn owned(&self, id: &str, actor: Option<&User>) -> Result<(Node, ObjectId), AppError> {
        let actor = require(actor, "user", "Authentication required.")?;
        let node = require(
            self.loaders.nodes.load(Some(id)).await?,
            "id",
            "Node not found.",
        )?;
        ensure(
            node.created_by_id == Some(actor.id),
            "user",
            "Only the creator can modify this node.",
        )?;
        Ok((node, actor.id))
    }

    pub async fn update_node(
        &self,
        id: &str,
        input: NodeUpdate,
        actor: Option<&User>,
    ) -> Result<Node, AppError> {
        let (mut node, actor_id) = self.owned(id, actor).await?;

        let title_changed = input.title.is_some() && normalized(input.title.clone()) != node.title;
        let content_changed = input.content.is_some() && input.content != node.content;
        if !title_changed && !content_changed {
            return Err(ValidationError::single("input", "No changes to apply.").into());
        }

        let mut violations = Violations::new();
        if title_changed {
            violations.check(
                node.relation_type == RelationType::Post && is_blank(input.title.as_deref()),
                "title",
                "Title is required.",
            );
        }
        if content_changed {
            check_content(&mut violations, Some(node.data_type), input.content.as_deref());
        }
        if let Err(err) = violations.finish() {
            tracing::warn!(id = %node.id, keys = ?err.keys().collect::<Vec<_>>(), "Rejected node update");
            return Err(err.into());
        }

        if title_changed {
            node.title = normalized(input.title);
        }
        if content_changed {
            node.content = input.content;
        }
        node.updated_by_id = Some(actor_id);
        node.updated_at = Some(update_timestamp(node.created_at));

        self.collection.replace_one(node.id, &node).await?;
        self.loaders.nodes.prime(&node).await;
        self.events.publish(Topic::Node, ChangeAction::Updated, node.id);
        tracing::info!(entity = "nodes", id = %node.id, "Node updated");

        Ok(node)
    }

    /// Soft delete. The record stays so that threads keep their shape.
    pub async fn delete_node(&self, id: &str, actor: Option<&User>) -> Result<Node, AppError> {
        let (node, _) = self.owned(id, actor).await?;

        let deleted = node.into_deleted();
        self.collection.replace_one(deleted.id, &deleted).await?;
        self.loaders.nodes.prime(&deleted).await;
        self.events.publish(Topic::Node, ChangeAction::Deleted, deleted.id);
        tracing::info!(entity = "nodes", id = %deleted.id, "Node deleted");

        Ok(deleted)
    }

    pub async fn all_nodes(
        &self,
        filter: Option<&NodeFilter>,
        order_by: Option<&str>,
        skip: Option<i64>,
        first: Option<i64>,
    ) -> Result<Vec<Node>, AppError> {
        list(
            self.collection.as_ref(),
            filter,
            ListArgs::new(order_by, skip, first),
            SORTABLE,
        )
        .await
    }

    pub async fn get_node_by_id(&self, id: Option<&str>) -> Result<Option<Node>, AppError> {
        self.loaders.nodes.load(id).await
    }

    /// Direct children of `parent_id`, or every root node for `None`.
    pub async fn nodes_by_parent(&self, parent_id: Option<&str>) -> Result<Vec<Node>, AppError> {
        self.all_nodes(Some(&NodeFilter::by_parent(parent_id)), None, None, None)
            .await
    }
}
