//! In-process implementation of [`Collection`].
//!
//! Documents are kept as BSON and queries are evaluated with the subset of
//! Mongo query semantics the repositories emit: field equality (with
//! null-matches-missing and array membership), `$and`, `$or`, `$nor`, `$eq`,
//! `$ne`, `$in`, `$nin`, `$all`, `$lt`, `$lte`, `$gt`, `$gte`, `$regex` and
//! `$exists`. Unknown operators match nothing.

use std::cmp::Ordering;
use std::marker::PhantomData;
use std::sync::Mutex;

use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{Bson, Document};
use regex::Regex;

use crate::db::collection::{Collection, QueryOptions};
use crate::db::models::Entity;
use crate::error::AppError;

pub struct MemoryCollection<T> {
    docs: Mutex<Vec<Document>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> MemoryCollection<T> {
    pub fn new() -> Self {
        Self {
            docs: Mutex::new(Vec::new()),
            _marker: PhantomData,
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<Document>>, AppError> {
        self.docs
            .lock()
            .map_err(|_| AppError::Database("memory collection lock poisoned".into()))
    }
}

impl<T> Default for MemoryCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn id_of(doc: &Document) -> Option<ObjectId> {
    doc.get_object_id("_id").ok()
}

#[async_trait]
impl<T: Entity> Collection<T> for MemoryCollection<T> {
    async fn insert_one(&self, doc: &T) -> Result<ObjectId, AppError> {
        let doc = bson::to_document(doc)?;
        let id = id_of(&doc)
            .ok_or_else(|| AppError::Internal(format!("{} document has no _id", T::COLLECTION)))?;

        let mut docs = self.lock()?;
        if docs.iter().any(|d| id_of(d) == Some(id)) {
            return Err(AppError::Database(format!(
                "duplicate key in {}: {}",
                T::COLLECTION,
                id
            )));
        }
        docs.push(doc);
        Ok(id)
    }

    async fn find_one(&self, filter: Document) -> Result<Option<T>, AppError> {
        let found = self
            .lock()?
            .iter()
            .find(|d| matches(d, &filter))
            .cloned();
        found.map(bson::from_document).transpose().map_err(Into::into)
    }

    async fn find(&self, filter: Document, options: QueryOptions) -> Result<Vec<T>, AppError> {
        let mut selected: Vec<Document> = self
            .lock()?
            .iter()
            .filter(|d| matches(d, &filter))
            .cloned()
            .collect();

        if let Some(sort) = &options.sort {
            selected.sort_by(|a, b| compare_by_spec(a, b, sort));
        }

        let skip = options.skip.unwrap_or(0) as usize;
        let limit = match options.limit {
            Some(0) | None => usize::MAX,
            Some(n) => n.unsigned_abs() as usize,
        };

        selected
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|d| bson::from_document(d).map_err(Into::into))
            .collect()
    }

    async fn replace_one(&self, id: ObjectId, doc: &T) -> Result<bool, AppError> {
        let replacement = bson::to_document(doc)?;
        let mut docs = self.lock()?;
        match docs.iter_mut().find(|d| id_of(d) == Some(id)) {
            Some(slot) => {
                *slot = replacement;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn add_to_set(&self, id: ObjectId, field: &str, value: Bson) -> Result<(), AppError> {
        let mut docs = self.lock()?;
        let Some(doc) = docs.iter_mut().find(|d| id_of(d) == Some(id)) else {
            return Ok(());
        };
        match doc.get_mut(field) {
            Some(Bson::Array(items)) => {
                if !items.contains(&value) {
                    items.push(value);
                }
            }
            Some(other) => {
                return Err(AppError::Database(format!(
                    "cannot $addToSet on non-array field '{field}' ({other})"
                )));
            }
            None => {
                doc.insert(field, Bson::Array(vec![value]));
            }
        }
        Ok(())
    }

    async fn delete_one(&self, id: ObjectId) -> Result<bool, AppError> {
        let mut docs = self.lock()?;
        let before = docs.len();
        docs.retain(|d| id_of(d) != Some(id));
        Ok(docs.len() != before)
    }

    async fn count(&self, filter: Document) -> Result<u64, AppError> {
        Ok(self.lock()?.iter().filter(|d| matches(d, &filter)).count() as u64)
    }
}

// ============================================================================
// Query evaluation
// ============================================================================

/// Does `doc` satisfy the Mongo query `filter`?
pub fn matches(doc: &Document, filter: &Document) -> bool {
    filter.iter().all(|(key, condition)| match key.as_str() {
        "$and" => sub_queries(condition).is_some_and(|subs| subs.iter().all(|q| matches(doc, q))),
        "$or" => sub_queries(condition).is_some_and(|subs| subs.iter().any(|q| matches(doc, q))),
        "$nor" => sub_queries(condition).is_some_and(|subs| !subs.iter().any(|q| matches(doc, q))),
        field => matches_field(doc.get(field), condition),
    })
}

fn sub_queries(condition: &Bson) -> Option<Vec<&Document>> {
    match condition {
        Bson::Array(items) => items.iter().map(Bson::as_document).collect(),
        _ => None,
    }
}

fn is_operator_doc(condition: &Bson) -> Option<&Document> {
    match condition {
        Bson::Document(ops) if ops.keys().next().is_some_and(|k| k.starts_with('$')) => Some(ops),
        _ => None,
    }
}

fn matches_field(value: Option<&Bson>, condition: &Bson) -> bool {
    match is_operator_doc(condition) {
        Some(ops) => ops.iter().all(|(op, arg)| apply_operator(value, op, arg)),
        None => equals(value, condition),
    }
}

fn equals(value: Option<&Bson>, target: &Bson) -> bool {
    match (value, target) {
        (None, Bson::Null) | (Some(Bson::Null), Bson::Null) => true,
        (None, _) => false,
        (Some(Bson::Array(items)), target) if !matches!(target, Bson::Array(_)) => {
            items.iter().any(|item| item == target)
        }
        (Some(v), target) => v == target,
    }
}

fn apply_operator(value: Option<&Bson>, op: &str, arg: &Bson) -> bool {
    match op {
        "$eq" => equals(value, arg),
        "$ne" => !equals(value, arg),
        "$in" => match arg {
            Bson::Array(candidates) => candidates.iter().any(|c| equals(value, c)),
            _ => false,
        },
        "$nin" => match arg {
            Bson::Array(candidates) => !candidates.iter().any(|c| equals(value, c)),
            _ => false,
        },
        "$all" => match (value, arg) {
            (Some(Bson::Array(items)), Bson::Array(required)) if !required.is_empty() => {
                required.iter().all(|r| items.contains(r))
            }
            _ => false,
        },
        "$lt" => compare_with(value, arg, |o| o == Ordering::Less),
        "$lte" => compare_with(value, arg, |o| o != Ordering::Greater),
        "$gt" => compare_with(value, arg, |o| o == Ordering::Greater),
        "$gte" => compare_with(value, arg, |o| o != Ordering::Less),
        "$regex" => match (value, arg) {
            (Some(Bson::String(s)), Bson::String(pattern)) => {
                Regex::new(pattern).is_ok_and(|re| re.is_match(s))
            }
            _ => false,
        },
        "$exists" => match arg {
            Bson::Boolean(expected) => value.is_some() == *expected,
            _ => false,
        },
        _ => false,
    }
}

fn compare_with(value: Option<&Bson>, arg: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    value
        .and_then(|v| compare_bson(v, arg))
        .is_some_and(accept)
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

/// Ordering between two comparable BSON values of the same family.
fn compare_bson(a: &Bson, b: &Bson) -> Option<Ordering> {
    match (a, b) {
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.timestamp_millis().cmp(&y.timestamp_millis())),
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.bytes().cmp(&y.bytes())),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        _ => as_f64(a)?.partial_cmp(&as_f64(b)?),
    }
}

/// Missing and null sort before any value, as in MongoDB.
fn compare_sort_values(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    let a = a.filter(|v| !matches!(v, Bson::Null));
    let b = b.filter(|v| !matches!(v, Bson::Null));
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => compare_bson(x, y).unwrap_or(Ordering::Equal),
    }
}

fn compare_by_spec(a: &Document, b: &Document, spec: &Document) -> Ordering {
    for (field, direction) in spec {
        let descending = as_f64(direction).is_some_and(|d| d < 0.0);
        let ord = compare_sort_values(a.get(field), b.get(field));
        let ord = if descending { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}
