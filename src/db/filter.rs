//! Filter trees and their compilation into MongoDB queries.
//!
//! A filter is a set of own predicates (ANDed together) plus an `OR` list of
//! nested filters. Compiling yields one sub-query for the own predicates,
//! if there are any, followed by the sub-queries of every branch. The
//! caller ORs the flat list together, so a filter with both own predicates
//! and branches selects `own OR branch1 OR branch2 ...`.
//!
//! Malformed ids, unknown enum values and unparseable dates never raise.
//! They compile to a clause that matches nothing.

use bson::oid::ObjectId;
use bson::{doc, Bson, DateTime, Document};
use chrono::{NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};

use crate::db::models::{DataType, LinkType, RelationType, VoteType};

/// A clause that selects no document.
fn match_nothing() -> Document {
    doc! { "_id": { "$in": [] } }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Lte,
    Gt,
    Gte,
}

impl Comparison {
    fn operator(self) -> &'static str {
        match self {
            Comparison::Lt => "$lt",
            Comparison::Lte => "$lte",
            Comparison::Gt => "$gt",
            Comparison::Gte => "$gte",
        }
    }
}

/// A single field test on one document.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Equals { field: &'static str, value: Bson },
    OneOf { field: &'static str, values: Vec<Bson> },
    /// Case-sensitive substring match.
    Contains { field: &'static str, needle: String },
    Compare { field: &'static str, op: Comparison, at: DateTime },
    /// The array field holds every one of `values`.
    ContainsAll { field: &'static str, values: Vec<Bson> },
    MatchAll,
    MatchNothing,
}

impl Predicate {
    pub fn to_clause(&self) -> Document {
        match self {
            Predicate::Equals { field, value } => doc! { *field: value.clone() },
            Predicate::OneOf { field, values } => doc! { *field: { "$in": values.clone() } },
            Predicate::Contains { field, needle } => {
                doc! { *field: { "$regex": regex::escape(needle) } }
            }
            Predicate::Compare { field, op, at } => doc! { *field: { op.operator(): *at } },
            Predicate::ContainsAll { field, values } => {
                if values.is_empty() {
                    doc! {}
                } else {
                    doc! { *field: { "$all": values.clone() } }
                }
            }
            Predicate::MatchAll => doc! {},
            Predicate::MatchNothing => match_nothing(),
        }
    }

    /// Equality on an id field. Unparseable ids match nothing.
    pub fn id_equals(field: &'static str, raw: &str) -> Predicate {
        match parse_id(raw) {
            Some(id) => Predicate::Equals {
                field,
                value: Bson::ObjectId(id),
            },
            None => Predicate::MatchNothing,
        }
    }

    /// Membership in a list of ids. Unparseable entries are dropped.
    pub fn id_in(field: &'static str, raw: &[String]) -> Predicate {
        Predicate::OneOf {
            field,
            values: raw
                .iter()
                .filter_map(|r| parse_id(r))
                .map(Bson::ObjectId)
                .collect(),
        }
    }

    /// Equality on a string enum field. Values outside the enum match nothing.
    pub fn enum_equals<E: Into<Bson>>(field: &'static str, parsed: Option<E>) -> Predicate {
        match parsed {
            Some(value) => Predicate::Equals {
                field,
                value: value.into(),
            },
            None => Predicate::MatchNothing,
        }
    }

    pub fn compare(field: &'static str, op: Comparison, input: &TimeInput) -> Predicate {
        match input.to_datetime() {
            Some(at) => Predicate::Compare { field, op, at },
            None => Predicate::MatchNothing,
        }
    }
}

pub fn parse_id(raw: &str) -> Option<ObjectId> {
    ObjectId::parse_str(raw.trim()).ok()
}

/// Own predicates plus ORed branches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterTree {
    pub own: Vec<Predicate>,
    pub or: Vec<FilterTree>,
}

/// Compile a tree into the flat list of sub-queries to be ORed together.
pub fn compile(tree: &FilterTree) -> Vec<Document> {
    let mut queries = Vec::new();
    if !tree.own.is_empty() {
        queries.push(conjunction(&tree.own));
    }
    for branch in &tree.or {
        queries.extend(compile(branch));
    }
    queries
}

fn conjunction(predicates: &[Predicate]) -> Document {
    let mut clauses: Vec<Document> = predicates
        .iter()
        .map(Predicate::to_clause)
        .filter(|clause| !clause.is_empty())
        .collect();

    match clauses.len() {
        0 => doc! {},
        1 => clauses.remove(0),
        _ => doc! { "$and": clauses },
    }
}

/// OR a compiled list together. An empty list selects everything.
pub fn combine(mut queries: Vec<Document>) -> Document {
    match queries.len() {
        0 => doc! {},
        1 => queries.remove(0),
        _ => doc! { "$or": queries },
    }
}

/// A filter input that can be turned into a [`FilterTree`].
pub trait IntoFilterTree {
    fn own_predicates(&self) -> Vec<Predicate>;

    fn branches(&self) -> &[Self]
    where
        Self: Sized;

    fn filter_tree(&self) -> FilterTree
    where
        Self: Sized,
    {
        FilterTree {
            own: self.own_predicates(),
            or: self.branches().iter().map(|b| b.filter_tree()).collect(),
        }
    }
}

/// Compile an optional filter straight into a store query.
pub fn to_query<F: IntoFilterTree>(filter: Option<&F>) -> Document {
    filter
        .map(|f| combine(compile(&f.filter_tree())))
        .unwrap_or_default()
}

// ============================================================================
// Inputs
// ============================================================================

/// A point in time given either as epoch milliseconds or as text
/// (RFC 3339, `YYYY-MM-DDTHH:MM:SS` in UTC, `YYYY-MM-DD` or a millisecond
/// count in a string).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TimeInput {
    Millis(i64),
    Float(f64),
    Text(String),
}

impl TimeInput {
    pub fn to_datetime(&self) -> Option<DateTime> {
        match self {
            TimeInput::Millis(ms) => Some(DateTime::from_millis(*ms)),
            TimeInput::Float(ms) if ms.is_finite() => Some(DateTime::from_millis(*ms as i64)),
            TimeInput::Float(_) => None,
            TimeInput::Text(text) => parse_time_text(text),
        }
    }
}

fn parse_time_text(text: &str) -> Option<DateTime> {
    let text = text.trim();
    if let Ok(ms) = text.parse::<i64>() {
        return Some(DateTime::from_millis(ms));
    }
    if let Ok(parsed) = chrono::DateTime::parse_from_rfc3339(text) {
        return Some(DateTime::from_chrono(parsed.with_timezone(&Utc)));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(DateTime::from_chrono(Utc.from_utc_datetime(&naive)));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| DateTime::from_chrono(Utc.from_utc_datetime(&naive)))
}

/// Tells an explicit `null` (`Some(None)`) apart from an absent key (`None`).
fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

fn push_time_range(
    own: &mut Vec<Predicate>,
    field: &'static str,
    [lt, lte, gt, gte]: [&Option<TimeInput>; 4],
) {
    let bounds = [
        (lt, Comparison::Lt),
        (lte, Comparison::Lte),
        (gt, Comparison::Gt),
        (gte, Comparison::Gte),
    ];
    for (input, op) in bounds {
        if let Some(input) = input {
            own.push(Predicate::compare(field, op, input));
        }
    }
}

fn push_ids(own: &mut Vec<Predicate>, id: &Option<String>, id_in: &Option<Vec<String>>) {
    if let Some(id) = id {
        own.push(Predicate::id_equals("_id", id));
    }
    if let Some(ids) = id_in {
        own.push(Predicate::id_in("_id", ids));
    }
}

fn push_contains(own: &mut Vec<Predicate>, field: &'static str, needle: &Option<String>) {
    if let Some(needle) = needle {
        own.push(Predicate::Contains {
            field,
            needle: needle.clone(),
        });
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeFilter {
    #[serde(rename = "OR", default)]
    pub or: Option<Vec<NodeFilter>>,
    pub id: Option<String>,
    pub id_in: Option<Vec<String>>,
    pub title_contains: Option<String>,
    pub content_contains: Option<String>,
    #[serde(rename = "createdAt_lt")]
    pub created_at_lt: Option<TimeInput>,
    #[serde(rename = "createdAt_lte")]
    pub created_at_lte: Option<TimeInput>,
    #[serde(rename = "createdAt_gt")]
    pub created_at_gt: Option<TimeInput>,
    #[serde(rename = "createdAt_gte")]
    pub created_at_gte: Option<TimeInput>,
    #[serde(rename = "updatedAt_lt")]
    pub updated_at_lt: Option<TimeInput>,
    #[serde(rename = "updatedAt_lte")]
    pub updated_at_lte: Option<TimeInput>,
    #[serde(rename = "updatedAt_gt")]
    pub updated_at_gt: Option<TimeInput>,
    #[serde(rename = "updatedAt_gte")]
    pub updated_at_gte: Option<TimeInput>,
    /// `Some(None)` selects nodes without a parent.
    #[serde(default, deserialize_with = "deserialize_some")]
    pub parent: Option<Option<String>>,
    /// `Some(None)` or an empty list selects every node.
    #[serde(default, deserialize_with = "deserialize_some")]
    pub children_contains: Option<Option<Vec<String>>>,
    #[serde(rename = "createdBy")]
    pub created_by: Option<String>,
    #[serde(rename = "dataType")]
    pub data_type: Option<String>,
    #[serde(rename = "relationType")]
    pub relation_type: Option<String>,
}

impl NodeFilter {
    pub fn by_parent(parent: Option<&str>) -> Self {
        NodeFilter {
            parent: Some(parent.map(str::to_string)),
            ..Default::default()
        }
    }
}

impl IntoFilterTree for NodeFilter {
    fn own_predicates(&self) -> Vec<Predicate> {
        let mut own = Vec::new();
        push_ids(&mut own, &self.id, &self.id_in);
        push_contains(&mut own, "title", &self.title_contains);
        push_contains(&mut own, "content", &self.content_contains);
        push_time_range(
            &mut own,
            "createdAt",
            [
                &self.created_at_lt,
                &self.created_at_lte,
                &self.created_at_gt,
                &self.created_at_gte,
            ],
        );
        push_time_range(
            &mut own,
            "updatedAt",
            [
                &self.updated_at_lt,
                &self.updated_at_lte,
                &self.updated_at_gt,
                &self.updated_at_gte,
            ],
        );

        match &self.parent {
            None => {}
            Some(None) => own.push(Predicate::Equals {
                field: "parentId",
                value: Bson::Null,
            }),
            Some(Some(raw)) => own.push(Predicate::id_equals("parentId", raw)),
        }

        match &self.children_contains {
            None => {}
            Some(None) => own.push(Predicate::MatchAll),
            Some(Some(raw)) => {
                let parsed: Option<Vec<Bson>> =
                    raw.iter().map(|r| parse_id(r).map(Bson::ObjectId)).collect();
                own.push(match parsed {
                    Some(values) => Predicate::ContainsAll {
                        field: "children",
                        values,
                    },
                    // An id that cannot exist is in no child set.
                    None => Predicate::MatchNothing,
                });
            }
        }

        if let Some(raw) = &self.created_by {
            own.push(Predicate::id_equals("createdById", raw));
        }
        if let Some(raw) = &self.data_type {
            own.push(Predicate::enum_equals("dataType", DataType::parse(raw)));
        }
        if let Some(raw) = &self.relation_type {
            own.push(Predicate::enum_equals(
                "relationType",
                RelationType::parse(raw),
            ));
        }
        own
    }

    fn branches(&self) -> &[Self] {
        self.or.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LinkFilter {
    #[serde(rename = "OR", default)]
    pub or: Option<Vec<LinkFilter>>,
    pub id: Option<String>,
    pub id_in: Option<Vec<String>>,
    #[serde(rename = "sourceNode")]
    pub source_node: Option<String>,
    #[serde(rename = "destNode")]
    pub dest_node: Option<String>,
    #[serde(rename = "createdBy")]
    pub created_by: Option<String>,
    #[serde(rename = "type")]
    pub link_type: Option<String>,
    #[serde(rename = "createdAt_lt")]
    pub created_at_lt: Option<TimeInput>,
    #[serde(rename = "createdAt_lte")]
    pub created_at_lte: Option<TimeInput>,
    #[serde(rename = "createdAt_gt")]
    pub created_at_gt: Option<TimeInput>,
    #[serde(rename = "createdAt_gte")]
    pub created_at_gte: Option<TimeInput>,
}

impl IntoFilterTree for LinkFilter {
    fn own_predicates(&self) -> Vec<Predicate> {
        let mut own = Vec::new();
        push_ids(&mut own, &self.id, &self.id_in);
        if let Some(raw) = &self.source_node {
            own.push(Predicate::id_equals("sourceNodeId", raw));
        }
        if let Some(raw) = &self.dest_node {
            own.push(Predicate::id_equals("destNodeId", raw));
        }
        if let Some(raw) = &self.created_by {
            own.push(Predicate::id_equals("createdById", raw));
        }
        if let Some(raw) = &self.link_type {
            own.push(Predicate::enum_equals("type", LinkType::parse(raw)));
        }
        push_time_range(
            &mut own,
            "createdAt",
            [
                &self.created_at_lt,
                &self.created_at_lte,
                &self.created_at_gt,
                &self.created_at_gte,
            ],
        );
        own
    }

    fn branches(&self) -> &[Self] {
        self.or.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VoteFilter {
    #[serde(rename = "OR", default)]
    pub or: Option<Vec<VoteFilter>>,
    pub id: Option<String>,
    pub id_in: Option<Vec<String>>,
    pub node: Option<String>,
    pub user: Option<String>,
    #[serde(rename = "type")]
    pub vote_type: Option<String>,
    #[serde(rename = "createdAt_lt")]
    pub created_at_lt: Option<TimeInput>,
    #[serde(rename = "createdAt_lte")]
    pub created_at_lte: Option<TimeInput>,
    #[serde(rename = "createdAt_gt")]
    pub created_at_gt: Option<TimeInput>,
    #[serde(rename = "createdAt_gte")]
    pub created_at_gte: Option<TimeInput>,
}

impl IntoFilterTree for VoteFilter {
    fn own_predicates(&self) -> Vec<Predicate> {
        let mut own = Vec::new();
        push_ids(&mut own, &self.id, &self.id_in);
        if let Some(raw) = &self.node {
            own.push(Predicate::id_equals("nodeId", raw));
        }
        if let Some(raw) = &self.user {
            own.push(Predicate::id_equals("userId", raw));
        }
        if let Some(raw) = &self.vote_type {
            own.push(Predicate::enum_equals("type", VoteType::parse(raw)));
        }
        push_time_range(
            &mut own,
            "createdAt",
            [
                &self.created_at_lt,
                &self.created_at_lte,
                &self.created_at_gt,
                &self.created_at_gte,
            ],
        );
        own
    }

    fn branches(&self) -> &[Self] {
        self.or.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserFilter {
    #[serde(rename = "OR", default)]
    pub or: Option<Vec<UserFilter>>,
    pub id: Option<String>,
    pub id_in: Option<Vec<String>>,
    pub username_contains: Option<String>,
    pub email_contains: Option<String>,
    #[serde(rename = "createdAt_lt")]
    pub created_at_lt: Option<TimeInput>,
    #[serde(rename = "createdAt_lte")]
    pub created_at_lte: Option<TimeInput>,
    #[serde(rename = "createdAt_gt")]
    pub created_at_gt: Option<TimeInput>,
    #[serde(rename = "createdAt_gte")]
    pub created_at_gte: Option<TimeInput>,
}

impl IntoFilterTree for UserFilter {
    fn own_predicates(&self) -> Vec<Predicate> {
        let mut own = Vec::new();
        push_ids(&mut own, &self.id, &self.id_in);
        push_contains(&mut own, "username", &self.username_contains);
        push_contains(&mut own, "email", &self.email_contains);
        push_time_range(
            &mut own,
            "createdAt",
            [
                &self.created_at_lt,
                &self.created_at_lte,
                &self.created_at_gt,
                &self.created_at_gte,
            ],
        );
        own
    }

    fn branches(&self) -> &[Self] {
        self.or.as_deref().unwrap_or_default()
    }
}

// ============================================================================
// Ordering
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy {
    pub field: &'static str,
    pub direction: SortDirection,
}

impl OrderBy {
    /// Parse `<field>_ASC` / `<field>_DESC` for one of the `sortable` fields.
    /// Anything else yields `None`, which keeps the store's natural order.
    pub fn parse(raw: &str, sortable: &[&'static str]) -> Option<Self> {
        let (field, direction) = raw.rsplit_once('_')?;
        let direction = match direction {
            "ASC" => SortDirection::Asc,
            "DESC" => SortDirection::Desc,
            _ => return None,
        };
        let field = sortable.iter().copied().find(|f| *f == field)?;
        Some(OrderBy { field, direction })
    }

    /// Sort document for this order. Ties on `field` fall back to `_id` in
    /// the same direction, so records written in the same millisecond page
    /// in creation order.
    pub fn to_sort(self) -> Document {
        let direction = match self.direction {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        };
        doc! { self.field: direction, "_id": direction }
    }
}
