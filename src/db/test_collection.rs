//! A [`MemoryCollection`] wrapper for unit tests: counts `find` calls and
//! can be told to fail `add_to_set`.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{Bson, Document};

use crate::db::collection::{Collection, QueryOptions};
use crate::db::memory_collection::MemoryCollection;
use crate::db::models::Entity;
use crate::error::AppError;

pub struct InstrumentedCollection<T> {
    inner: MemoryCollection<T>,
    finds: AtomicUsize,
    fail_add_to_set: AtomicBool,
}

impl<T> InstrumentedCollection<T> {
    pub fn new() -> Self {
        Self {
            inner: MemoryCollection::new(),
            finds: AtomicUsize::new(0),
            fail_add_to_set: AtomicBool::new(false),
        }
    }

    pub fn finds(&self) -> usize {
        self.finds.load(Ordering::SeqCst)
    }

    pub fn fail_add_to_set(&self) {
        self.fail_add_to_set.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl<T: Entity> Collection<T> for InstrumentedCollection<T> {
    async fn insert_one(&self, doc: &T) -> Result<ObjectId, AppError> {
        self.inner.insert_one(doc).await
    }

    async fn find_one(&self, filter: Document) -> Result<Option<T>, AppError> {
        self.inner.find_one(filter).await
    }

    async fn find(&self, filter: Document, options: QueryOptions) -> Result<Vec<T>, AppError> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        self.inner.find(filter, options).await
    }

    async fn replace_one(&self, id: ObjectId, doc: &T) -> Result<bool, AppError> {
        self.inner.replace_one(id, doc).await
    }

    async fn add_to_set(&self, id: ObjectId, field: &str, value: Bson) -> Result<(), AppError> {
        if self.fail_add_to_set.load(Ordering::SeqCst) {
            return Err(AppError::Database("add_to_set failed".into()));
        }
        self.inner.add_to_set(id, field, value).await
    }

    async fn delete_one(&self, id: ObjectId) -> Result<bool, AppError> {
        self.inner.delete_one(id).await
    }

    async fn count(&self, filter: Document) -> Result<u64, AppError> {
        self.inner.count(filter).await
    }
}
