use std::sync::Arc;

use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{Bson, Document};

use crate::db::memory_collection::MemoryCollection;
use crate::db::models::{Link, Node, User, Vote};
use crate::error::AppError;

/// Sort / skip / limit applied to a `find`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    /// Mongo-style sort spec, e.g. `{ "createdAt": 1 }`. `None` keeps the
    /// store's natural order.
    pub sort: Option<Document>,
    pub skip: Option<u64>,
    pub limit: Option<i64>,
}

/// The document-store primitive every repository is written against.
///
/// Queries are Mongo query documents. Abstracted as a trait so the
/// repositories run unchanged against MongoDB or the in-process store.
#[async_trait]
pub trait Collection<T>: Send + Sync
where
    T: Send + Sync,
{
    /// Insert a new document and return its `_id`.
    async fn insert_one(&self, doc: &T) -> Result<ObjectId, AppError>;

    /// First document matching `filter`, if any.
    async fn find_one(&self, filter: Document) -> Result<Option<T>, AppError>;

    /// All documents matching `filter`, with sort applied before skip and limit.
    async fn find(&self, filter: Document, options: QueryOptions) -> Result<Vec<T>, AppError>;

    /// Replace the document with the given `_id`. Returns `false` when none matched.
    async fn replace_one(&self, id: ObjectId, doc: &T) -> Result<bool, AppError>;

    /// Add `value` to the array `field` unless already present.
    async fn add_to_set(&self, id: ObjectId, field: &str, value: Bson) -> Result<(), AppError>;

    /// Remove the document with the given `_id`. Returns `false` when none matched.
    async fn delete_one(&self, id: ObjectId) -> Result<bool, AppError>;

    async fn count(&self, filter: Document) -> Result<u64, AppError>;
}

/// One handle per stored entity kind, shared by every unit of work.
#[derive(Clone)]
pub struct Collections {
    pub nodes: Arc<dyn Collection<Node>>,
    pub links: Arc<dyn Collection<Link>>,
    pub votes: Arc<dyn Collection<Vote>>,
    pub users: Arc<dyn Collection<User>>,
}

impl Collections {
    /// Empty in-process collections.
    pub fn in_memory() -> Self {
        Self {
            nodes: Arc::new(MemoryCollection::<Node>::new()),
            links: Arc::new(MemoryCollection::<Link>::new()),
            votes: Arc::new(MemoryCollection::<Vote>::new()),
            users: Arc::new(MemoryCollection::<User>::new()),
        }
    }

    #[cfg(feature = "mongo")]
    pub fn mongo(db: &mongodb::Database) -> Self {
        use crate::db::mongo_collection::MongoCollection;

        Self {
            nodes: Arc::new(MongoCollection::<Node>::new(db)),
            links: Arc::new(MongoCollection::<Link>::new(db)),
            votes: Arc::new(MongoCollection::<Vote>::new(db)),
            users: Arc::new(MongoCollection::<User>::new(db)),
        }
    }
}
