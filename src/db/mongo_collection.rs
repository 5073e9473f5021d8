use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{doc, Bson, Document};
use futures::TryStreamExt;
use mongodb::options::{FindOptions, IndexOptions};
use mongodb::IndexModel;

use crate::db::collection::{Collection, QueryOptions};
use crate::db::models::{Entity, Node, User, Vote};
use crate::error::AppError;

/// MongoDB implementation of [`Collection`].
pub struct MongoCollection<T: Send + Sync> {
    collection: mongodb::Collection<T>,
}

impl<T: Entity> MongoCollection<T> {
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            collection: db.collection(T::COLLECTION),
        }
    }
}

#[async_trait]
impl<T: Entity> Collection<T> for MongoCollection<T> {
    async fn insert_one(&self, doc: &T) -> Result<ObjectId, AppError> {
        self.collection
            .insert_one(doc)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(doc.id())
    }

    async fn find_one(&self, filter: Document) -> Result<Option<T>, AppError> {
        self.collection
            .find_one(filter)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn find(&self, filter: Document, options: QueryOptions) -> Result<Vec<T>, AppError> {
        let find_options = FindOptions::builder()
            .sort(options.sort)
            .skip(options.skip)
            .limit(options.limit)
            .build();

        let mut cursor = self
            .collection
            .find(filter)
            .with_options(find_options)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let mut documents = Vec::new();
        while let Some(doc) = cursor
            .try_next()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
        {
            documents.push(doc);
        }

        Ok(documents)
    }

    async fn replace_one(&self, id: ObjectId, doc: &T) -> Result<bool, AppError> {
        let result = self
            .collection
            .replace_one(doc! { "_id": id }, doc)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(result.matched_count > 0)
    }

    async fn add_to_set(&self, id: ObjectId, field: &str, value: Bson) -> Result<(), AppError> {
        self.collection
            .update_one(doc! { "_id": id }, doc! { "$addToSet": { field: value } })
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn delete_one(&self, id: ObjectId) -> Result<bool, AppError> {
        let result = self
            .collection
            .delete_one(doc! { "_id": id })
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(result.deleted_count > 0)
    }

    async fn count(&self, filter: Document) -> Result<u64, AppError> {
        self.collection
            .count_documents(filter)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

/// Create the unique indexes the repositories rely on.
///
/// Email uniqueness and one vote per (user, node) are checked before every
/// write, but two concurrent requests can both pass the check; the indexes
/// make the second insert fail instead of storing a duplicate.
pub async fn ensure_indexes(db: &mongodb::Database) -> Result<(), AppError> {
    let unique = || IndexOptions::builder().unique(true).build();

    db.collection::<User>(User::COLLECTION)
        .create_index(
            IndexModel::builder()
                .keys(doc! { "email": 1 })
                .options(unique())
                .build(),
        )
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

    db.collection::<Vote>(Vote::COLLECTION)
        .create_index(
            IndexModel::builder()
                .keys(doc! { "userId": 1, "nodeId": 1 })
                .options(unique())
                .build(),
        )
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

    db.collection::<Node>(Node::COLLECTION)
        .create_index(IndexModel::builder().keys(doc! { "parentId": 1 }).build())
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

    tracing::info!("MongoDB indexes ensured");
    Ok(())
}
