use crate::db::collection::{Collection, QueryOptions};
use crate::db::filter::{compile, combine, IntoFilterTree, OrderBy};
use crate::db::models::Entity;
use crate::error::AppError;
use crate::validation::Violations;

/// Paging and ordering arguments shared by every `all_*` query.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListArgs<'a> {
    pub order_by: Option<&'a str>,
    pub skip: Option<i64>,
    pub first: Option<i64>,
}

impl<'a> ListArgs<'a> {
    pub fn new(order_by: Option<&'a str>, skip: Option<i64>, first: Option<i64>) -> Self {
        Self {
            order_by,
            skip,
            first,
        }
    }

    /// Store options for these arguments. `Ok(None)` means `first` is zero
    /// and the answer is empty without asking the store.
    pub fn to_options(&self, sortable: &[&'static str]) -> Result<Option<QueryOptions>, AppError> {
        let mut violations = Violations::new();
        violations.check(self.skip.is_some_and(|n| n < 0), "skip", "Must not be negative.");
        violations.check(self.first.is_some_and(|n| n < 0), "first", "Must not be negative.");
        violations.finish()?;

        if self.first == Some(0) {
            return Ok(None);
        }

        Ok(Some(QueryOptions {
            sort: self
                .order_by
                .and_then(|raw| OrderBy::parse(raw, sortable))
                .map(OrderBy::to_sort),
            skip: self.skip.map(|n| n as u64),
            limit: self.first,
        }))
    }
}

/// Run an `all_*` query: compile the filter, OR the branches together,
/// then sort, skip and limit.
pub async fn list<T, F>(
    collection: &dyn Collection<T>,
    filter: Option<&F>,
    args: ListArgs<'_>,
    sortable: &[&'static str],
) -> Result<Vec<T>, AppError>
where
    T: Entity,
    F: IntoFilterTree,
{
    let sub_queries = filter.map(|f| compile(&f.filter_tree())).unwrap_or_default();

    tracing::debug!(
        entity = T::COLLECTION,
        sub_queries = sub_queries.len(),
        skip = ?args.skip,
        first = ?args.first,
        order_by = ?args.order_by,
        "Listing {}",
        T::COLLECTION
    );

    let Some(options) = args.to_options(sortable)? else {
        return Ok(Vec::new());
    };

    collection.find(combine(sub_queries), options).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    const SORTABLE: &[&str] = &["createdAt", "updatedAt"];

    #[test]
    fn test_options_from_args() {
        let options = ListArgs::new(Some("createdAt_DESC"), Some(2), Some(5))
            .to_options(SORTABLE)
            .unwrap()
            .unwrap();
        assert_eq!(options.sort, Some(doc! { "createdAt": -1 }));
        assert_eq!(options.skip, Some(2));
        assert_eq!(options.limit, Some(5));
    }

    #[test]
    fn test_unknown_order_keeps_natural_order() {
        let options = ListArgs::new(Some("title_ASC"), None, None)
            .to_options(SORTABLE)
            .unwrap()
            .unwrap();
        assert_eq!(options, QueryOptions::default());
    }

    #[test]
    fn test_first_zero_is_empty() {
        assert!(ListArgs::new(None, None, Some(0))
            .to_options(SORTABLE)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_negative_paging_reports_both_keys() {
        let err = ListArgs::new(None, Some(-1), Some(-3))
            .to_options(SORTABLE)
            .unwrap_err();
        let validation = err.as_validation().unwrap();
        assert_eq!(validation.keys().collect::<Vec<_>>(), vec!["skip", "first"]);
    }
}
