//! Narrowing dependent queries and resolving via steps.

use crate::bucket::PivotMap;
use crate::config::LoaderConfig;
use relmodel_core::query::Condition;
use relmodel_core::{
    Executor, LinkSpec, LookupKey, PlainRecord, Query, RecordRef, RecordView, RelationDescriptor,
    Result, Value,
};
use std::collections::HashSet;

/// The intermediate records of an indirect relation.
#[derive(Debug, Default)]
pub struct ViaStep {
    /// Junction rows or intermediate relation records.
    pub models: Vec<RecordRef>,
    /// Pivot map of the intermediate relation's own via chain, if any.
    pub inner: Option<PivotMap>,
}

/// Distinct key values collected from one side of a link.
#[derive(Default)]
struct KeyValues {
    seen: HashSet<LookupKey>,
    values: Vec<Vec<Value>>,
    /// Null-bearing tuples, kept only when null keys match.
    nulls: Vec<Vec<Value>>,
}

impl KeyValues {
    fn push(&mut self, tuple: Vec<Value>, keep_nulls: bool) {
        let has_null = tuple.iter().any(Value::is_null);
        if has_null && !keep_nulls {
            return;
        }
        if !self.seen.insert(LookupKey::from_values(&tuple)) {
            return;
        }
        if has_null {
            self.nulls.push(tuple);
        } else {
            self.values.push(tuple);
        }
    }

    fn is_empty(&self) -> bool {
        self.values.is_empty() && self.nulls.is_empty()
    }

    /// `IN` over the non-null tuples, or-ed with one exact match per
    /// null-bearing tuple.
    fn into_condition(self, columns: Vec<String>) -> Condition {
        let mut branches: Vec<Condition> = self
            .nulls
            .iter()
            .map(|tuple| {
                let mut parts: Vec<Condition> = columns
                    .iter()
                    .zip(tuple)
                    .map(|(column, value)| match value {
                        Value::Null => Condition::is_null(column.clone()),
                        value => Condition::eq(column.clone(), value.clone()),
                    })
                    .collect();
                if parts.len() == 1 {
                    parts.remove(0)
                } else {
                    Condition::And(parts)
                }
            })
            .collect();
        if branches.is_empty() {
            return Condition::in_tuples(columns, self.values);
        }
        if !self.values.is_empty() {
            branches.insert(0, Condition::in_tuples(columns, self.values));
        }
        if branches.len() == 1 {
            branches.remove(0)
        } else {
            Condition::Or(branches)
        }
    }
}

/// Narrow `query` to records matching `models` through `link`.
///
/// The local attributes of `link` are read from `models`; the resulting
/// `IN` condition targets its foreign attributes. Array values are
/// flattened and duplicates are removed. Null (or missing) values are
/// skipped unless `config.null_keys_match` is set, in which case they
/// become `IS NULL` matches. When nothing is left the query is marked as
/// emulated, so it never reaches storage.
pub fn filter_by_models(
    query: Query,
    link: &LinkSpec,
    models: &[RecordRef],
    config: &LoaderConfig,
) -> Query {
    let keep_nulls = config.null_keys_match;
    let local = link.local_attributes();
    let foreign: Vec<String> = link
        .foreign_attributes()
        .into_iter()
        .map(str::to_string)
        .collect();

    let mut keys = KeyValues::default();
    for model in models {
        if let [attribute] = local.as_slice() {
            match model.attribute(attribute) {
                Some(Value::Array(items)) => {
                    for item in items {
                        keys.push(vec![item], keep_nulls);
                    }
                }
                Some(value) => keys.push(vec![value], keep_nulls),
                None => keys.push(vec![Value::Null], keep_nulls),
            }
        } else {
            let tuple: Vec<Value> = {
                let record = model.borrow();
                local
                    .iter()
                    .map(|a| record.attribute(a).cloned().unwrap_or(Value::Null))
                    .collect()
            };
            keys.push(tuple, keep_nulls);
        }
    }

    if keys.is_empty() {
        tracing::debug!(
            table = query.from_table(),
            "No usable key values, emulating execution"
        );
        return query.emulate_execution();
    }

    tracing::trace!(
        table = query.from_table(),
        values = keys.values.len(),
        nulls = keys.nulls.len(),
        "Narrowed dependent query"
    );
    query.and_where(keys.into_condition(foreign))
}

/// Read the junction rows reachable from `primaries`.
///
/// Junction rows are always hydrated as plain records. No query is issued
/// for an empty primary set.
pub fn find_junction_rows(
    db: &dyn Executor,
    primaries: &[RecordRef],
    junction: &RelationDescriptor,
    config: &LoaderConfig,
) -> Result<Vec<RecordRef>> {
    if primaries.is_empty() {
        return Ok(Vec::new());
    }
    let query =
        filter_by_models(junction.base_query(), &junction.link, primaries, config).as_array(true);
    let rows = query.all(db)?;
    tracing::debug!(
        table = %junction.target,
        rows = rows.len(),
        "Fetched junction rows"
    );
    Ok(rows
        .into_iter()
        .map(|row| RecordRef::new(PlainRecord::from_row(row)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use relmodel_core::Row;
    use relmodel_memory::MemoryExecutor;

    fn rec(pairs: &[(&str, Value)]) -> RecordRef {
        let mut record = PlainRecord::new();
        for (k, v) in pairs {
            record.set_attribute(k, v.clone());
        }
        RecordRef::new(record)
    }

    fn in_condition(query: &Query) -> Option<&Condition> {
        query
            .conditions()
            .iter()
            .find(|c| matches!(c, Condition::In { .. }))
    }

    #[test]
    fn test_single_column_values_are_distinct_and_flattened() {
        let models = vec![
            rec(&[("id", Value::BigInt(1))]),
            rec(&[("id", Value::Int(1))]),
            rec(&[("id", Value::Null)]),
            rec(&[("id", Value::from(vec![2_i64, 3]))]),
            rec(&[]),
        ];
        let query = filter_by_models(
            Query::new("order"),
            &LinkSpec::single("id", "customer_id"),
            &models,
            &LoaderConfig::default(),
        );

        assert!(!query.is_emulated());
        assert_eq!(
            in_condition(&query),
            Some(&Condition::In {
                columns: vec!["customer_id".into()],
                values: vec![
                    vec![Value::BigInt(1)],
                    vec![Value::BigInt(2)],
                    vec![Value::BigInt(3)]
                ],
            })
        );
    }

    #[test]
    fn test_composite_tuples_skip_nulls() {
        let models = vec![
            rec(&[("a", Value::BigInt(1)), ("b", Value::BigInt(2))]),
            rec(&[("a", Value::BigInt(1)), ("b", Value::Null)]),
            rec(&[("a", Value::BigInt(1)), ("b", Value::BigInt(2))]),
        ];
        let query = filter_by_models(
            Query::new("t"),
            &LinkSpec::new([("a", "x"), ("b", "y")]),
            &models,
            &LoaderConfig::default(),
        );
        assert_eq!(
            in_condition(&query),
            Some(&Condition::in_tuples(
                vec!["x".into(), "y".into()],
                vec![vec![Value::BigInt(1), Value::BigInt(2)]]
            ))
        );
    }

    #[test]
    fn test_no_values_emulates_execution() {
        let models = vec![rec(&[("id", Value::Null)])];
        let query = filter_by_models(
            Query::new("order"),
            &LinkSpec::single("id", "customer_id"),
            &models,
            &LoaderConfig::default(),
        );
        assert!(query.is_emulated());
        assert!(in_condition(&query).is_none());
    }

    #[test]
    fn test_null_keys_become_is_null_matches_when_configured() {
        let config = LoaderConfig::default().null_keys_match(true);
        let models = vec![
            rec(&[("id", Value::Null)]),
            rec(&[("id", Value::BigInt(1))]),
            rec(&[]),
        ];
        let query = filter_by_models(
            Query::new("order"),
            &LinkSpec::single("id", "customer_id"),
            &models,
            &config,
        );

        assert!(!query.is_emulated());
        assert_eq!(
            query.conditions(),
            &[Condition::Or(vec![
                Condition::in_list("customer_id", [1_i64]),
                Condition::is_null("customer_id"),
            ])]
        );

        let only_null = filter_by_models(
            Query::new("order"),
            &LinkSpec::single("id", "customer_id"),
            &models[..1],
            &config,
        );
        assert!(!only_null.is_emulated());
        assert_eq!(only_null.conditions(), &[Condition::is_null("customer_id")]);
    }

    #[test]
    fn test_composite_null_tuples_match_column_by_column() {
        let config = LoaderConfig::default().null_keys_match(true);
        let models = vec![rec(&[("a", Value::BigInt(1)), ("b", Value::Null)])];
        let query = filter_by_models(
            Query::new("t"),
            &LinkSpec::new([("a", "x"), ("b", "y")]),
            &models,
            &config,
        );
        assert_eq!(
            query.conditions(),
            &[Condition::And(vec![Condition::eq("x", 1_i64), Condition::is_null("y")])]
        );
    }

    #[test]
    fn test_junction_rows_skip_storage_for_empty_primaries() {
        let db = MemoryExecutor::new();
        let junction = RelationDescriptor::has_many("membership", LinkSpec::single("id", "user_id"));
        assert!(find_junction_rows(&db, &[], &junction, &LoaderConfig::default()).unwrap().is_empty());
        assert_eq!(db.query_count(), 0);
    }

    #[test]
    fn test_junction_rows_are_plain_and_narrowed() {
        let db = MemoryExecutor::new().with_table(
            "membership",
            [
                Row::from_pairs([("user_id", 1_i64), ("group_id", 5_i64)]),
                Row::from_pairs([("user_id", 2_i64), ("group_id", 6_i64)]),
            ],
        );
        let junction = RelationDescriptor::has_many("membership", LinkSpec::single("id", "user_id"));
        let rows = find_junction_rows(
            &db,
            &[rec(&[("id", Value::BigInt(1))])],
            &junction,
            &LoaderConfig::default(),
        )
        .unwrap();

        assert_eq!(rows.len(), 1);
        assert!(!rows[0].is_structured());
        assert_eq!(rows[0].attribute("group_id"), Some(Value::BigInt(5)));
        assert!(db.queries()[0].is_as_array());
    }
}
