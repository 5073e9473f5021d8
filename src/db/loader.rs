//! Per-unit-of-work batched point lookups.
//!
//! A [`BatchLoader`] wraps an `async_graphql` [`DataLoader`] with a
//! `HashMapCache`. Every `load` issued before the batch delay elapses is
//! coalesced into one `$in` query, duplicate keys are fetched once, and the
//! outcome (including "not found") is cached for the loader's lifetime.
//! Loaders are never shared between units of work: [`Loaders::new`] builds a
//! fresh set each time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_graphql::dataloader::{DataLoader, HashMapCache, Loader};
use bson::doc;
use bson::oid::ObjectId;

use crate::db::collection::{Collection, Collections, QueryOptions};
use crate::db::models::{Entity, Link, Node, User, Vote};
use crate::error::AppError;

/// Canonical form of a textual id. Blank or malformed ids have none.
pub fn canonical_id(raw: &str) -> Option<ObjectId> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    ObjectId::parse_str(raw).ok()
}

/// Fetch `ids` in one query and align the result with the input: slot `i`
/// holds the entity for `ids[i]`, or `None` when it does not resolve.
pub async fn fetch_by_ids<T: Entity>(
    collection: &dyn Collection<T>,
    ids: &[ObjectId],
) -> Result<Vec<Option<T>>, AppError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let found = collection
        .find(doc! { "_id": { "$in": ids.to_vec() } }, QueryOptions::default())
        .await?;
    let by_id: HashMap<ObjectId, T> = found.into_iter().map(|e| (e.id(), e)).collect();

    Ok(ids.iter().map(|id| by_id.get(id).cloned()).collect())
}

/// The raw batch function behind a [`BatchLoader`].
pub struct EntityLoader<T: Entity> {
    collection: Arc<dyn Collection<T>>,
}

impl<T: Entity> Loader<ObjectId> for EntityLoader<T> {
    type Value = Option<T>;
    type Error = Arc<AppError>;

    async fn load(&self, keys: &[ObjectId]) -> Result<HashMap<ObjectId, Self::Value>, Self::Error> {
        tracing::debug!(
            entity = T::COLLECTION,
            key_count = keys.len(),
            "Batch loading {} by id",
            T::COLLECTION
        );

        let found = fetch_by_ids(self.collection.as_ref(), keys)
            .await
            .map_err(Arc::new)?;

        Ok(keys.iter().copied().zip(found).collect())
    }
}

fn unshare(err: Arc<AppError>) -> AppError {
    Arc::try_unwrap(err).unwrap_or_else(|shared| (*shared).clone())
}

pub struct BatchLoader<T: Entity> {
    inner: DataLoader<EntityLoader<T>, HashMapCache>,
}

impl<T: Entity> BatchLoader<T> {
    pub fn new(collection: Arc<dyn Collection<T>>, delay: Duration) -> Self {
        let inner = DataLoader::with_cache(
            EntityLoader { collection },
            tokio::spawn,
            HashMapCache::default(),
        )
        .delay(delay);
        Self { inner }
    }

    /// Resolve a textual id. Absent, blank and malformed ids resolve to
    /// `None` without touching the store.
    pub async fn load(&self, raw: Option<&str>) -> Result<Option<T>, AppError> {
        match raw.and_then(canonical_id) {
            Some(id) => self.load_id(id).await,
            None => Ok(None),
        }
    }

    pub async fn load_id(&self, id: ObjectId) -> Result<Option<T>, AppError> {
        self.inner
            .load_one(id)
            .await
            .map(Option::flatten)
            .map_err(unshare)
    }

    /// Cache `entity` as the current value of its id, e.g. after a write.
    pub async fn prime(&self, entity: &T) {
        self.inner.feed_one(entity.id(), Some(entity.clone())).await;
    }

    /// Cache `id` as missing, e.g. after a hard delete.
    pub async fn forget(&self, id: ObjectId) {
        self.inner.feed_one(id, None).await;
    }
}

/// The loaders for one unit of work.
pub struct Loaders {
    pub nodes: BatchLoader<Node>,
    pub links: BatchLoader<Link>,
    pub votes: BatchLoader<Vote>,
    pub users: BatchLoader<User>,
}

impl Loaders {
    pub fn new(collections: &Collections, delay: Duration) -> Self {
        Self {
            nodes: BatchLoader::new(collections.nodes.clone(), delay),
            links: BatchLoader::new(collections.links.clone(), delay),
            votes: BatchLoader::new(collections.votes.clone(), delay),
            users: BatchLoader::new(collections.users.clone(), delay),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{DataType, RelationType};
    use crate::db::test_collection::InstrumentedCollection;
    use bson::DateTime;

    fn node(title: &str) -> Node {
        Node {
            id: ObjectId::new(),
            data_type: DataType::Text,
            relation_type: RelationType::Post,
            title: Some(title.to_string()),
            content: Some("body".into()),
            parent_id: None,
            children: Vec::new(),
            created_by_id: None,
            updated_by_id: None,
            created_at: Some(DateTime::now()),
            updated_at: Some(DateTime::now()),
        }
    }

    async fn counting_with(nodes: &[Node]) -> Arc<InstrumentedCollection<Node>> {
        let store = Arc::new(InstrumentedCollection::new());
        for n in nodes {
            store.insert_one(n).await.unwrap();
        }
        store
    }

    fn loader_over(store: &Arc<InstrumentedCollection<Node>>) -> BatchLoader<Node> {
        let collection: Arc<dyn Collection<Node>> = store.clone();
        BatchLoader::new(collection, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_fetch_by_ids_is_positional() {
        let a = node("a");
        let b = node("b");
        let store = counting_with(&[a.clone(), b.clone()]).await;
        let missing = ObjectId::new();

        let got = fetch_by_ids::<Node>(store.as_ref(), &[b.id, missing, a.id, b.id])
            .await
            .unwrap();

        assert_eq!(got.len(), 4);
        assert_eq!(got[0].as_ref().map(|n| n.id), Some(b.id));
        assert!(got[1].is_none());
        assert_eq!(got[2].as_ref().map(|n| n.id), Some(a.id));
        assert_eq!(got[3].as_ref().map(|n| n.id), Some(b.id));
    }

    #[tokio::test]
    async fn test_concurrent_loads_of_same_id_fetch_once() {
        let a = node("a");
        let store = counting_with(&[a.clone()]).await;
        let loader = loader_over(&store);

        let hex = a.id.to_hex();
        let upper = hex.to_uppercase();
        let (first, second) = tokio::join!(
            loader.load(Some(hex.as_str())),
            loader.load(Some(upper.as_str()))
        );

        assert_eq!(first.unwrap().map(|n| n.id), Some(a.id));
        assert_eq!(second.unwrap().map(|n| n.id), Some(a.id));
        assert_eq!(store.finds(), 1);
    }

    #[tokio::test]
    async fn test_distinct_ids_share_one_batch() {
        let a = node("a");
        let b = node("b");
        let store = counting_with(&[a.clone(), b.clone()]).await;
        let loader = loader_over(&store);

        let (x, y) = tokio::join!(loader.load_id(a.id), loader.load_id(b.id));
        assert!(x.unwrap().is_some());
        assert!(y.unwrap().is_some());
        assert_eq!(store.finds(), 1);
    }

    #[tokio::test]
    async fn test_resolved_ids_are_cached_including_misses() {
        let a = node("a");
        let store = counting_with(&[a.clone()]).await;
        let loader = loader_over(&store);
        let missing = ObjectId::new();

        assert!(loader.load_id(a.id).await.unwrap().is_some());
        assert!(loader.load_id(missing).await.unwrap().is_none());
        let after_first_round = store.finds();

        assert!(loader.load_id(a.id).await.unwrap().is_some());
        assert!(loader.load_id(missing).await.unwrap().is_none());
        assert_eq!(store.finds(), after_first_round);
    }

    #[tokio::test]
    async fn test_bad_ids_resolve_to_none_without_fetching() {
        let store = counting_with(&[]).await;
        let loader = loader_over(&store);

        assert!(loader.load(None).await.unwrap().is_none());
        assert!(loader.load(Some("")).await.unwrap().is_none());
        assert!(loader.load(Some("   ")).await.unwrap().is_none());
        assert!(loader.load(Some("not-an-object-id")).await.unwrap().is_none());
        assert_eq!(store.finds(), 0);
    }

    #[tokio::test]
    async fn test_fresh_loader_sees_changes_made_after_another_cached() {
        let mut a = node("before");
        let store = counting_with(&[a.clone()]).await;

        let first = loader_over(&store);
        assert_eq!(
            first.load_id(a.id).await.unwrap().unwrap().title.as_deref(),
            Some("before")
        );

        a.title = Some("after".into());
        store.replace_one(a.id, &a).await.unwrap();

        // The old unit of work keeps its snapshot; a new one does not.
        assert_eq!(
            first.load_id(a.id).await.unwrap().unwrap().title.as_deref(),
            Some("before")
        );
        let second = loader_over(&store);
        assert_eq!(
            second.load_id(a.id).await.unwrap().unwrap().title.as_deref(),
            Some("after")
        );
    }

    #[tokio::test]
    async fn test_prime_and_forget() {
        let a = node("a");
        let store = counting_with(&[a.clone()]).await;
        let loader = loader_over(&store);

        let mut primed = a.clone();
        primed.title = Some("primed".into());
        loader.prime(&primed).await;
        assert_eq!(
            loader.load_id(a.id).await.unwrap().unwrap().title.as_deref(),
            Some("primed")
        );

        loader.forget(a.id).await;
        assert!(loader.load_id(a.id).await.unwrap().is_none());
        assert_eq!(store.finds(), 0);
    }

    #[test]
    fn test_canonical_id() {
        let id = ObjectId::new();
        assert_eq!(canonical_id(&id.to_hex()), Some(id));
        assert_eq!(canonical_id(&format!("  {}  ", id.to_hex())), Some(id));
        assert_eq!(canonical_id(&id.to_hex().to_uppercase()), Some(id));
        assert_eq!(canonical_id("xyz"), None);
        assert_eq!(canonical_id(""), None);
    }
}
