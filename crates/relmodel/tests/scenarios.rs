//! End-to-end resolution over small in-memory datasets.

mod common;

use common::{directory, ids_of, int, plain, related_ids, shop};
use relmodel::prelude::*;
use relmodel::build_buckets;

fn orders_by_customer() -> RelationDescriptor {
    RelationDescriptor::has_many("order", LinkSpec::single("id", "customer_id"))
}

#[test]
fn test_single_key_to_many() {
    let fx = shop();
    let primaries = vec![plain(&[("id", int(1))]), plain(&[("id", int(2))])];

    let related = fx
        .loader
        .populate_relation("orders", &orders_by_customer(), &primaries)
        .unwrap();

    assert_eq!(ids_of(&related), vec![10, 11, 12]);
    assert_eq!(related_ids(&primaries[0], "orders"), vec![10, 11]);
    assert_eq!(related_ids(&primaries[1], "orders"), vec![12]);
    assert_eq!(fx.db.query_count(), 1);
}

#[test]
fn test_composite_key_to_one() {
    let db = Arc::new(MemoryExecutor::new());
    db.load_json(
        "pair",
        &serde_json::json!([
            {"x": 1, "y": 2, "val": "Z"},
            {"x": 1, "y": 3, "val": "W"}
        ]),
    )
    .unwrap();
    let loader = RelationLoader::new(
        Arc::new(Registry::new()),
        Arc::clone(&db) as Arc<dyn Executor>,
    );
    let relation =
        RelationDescriptor::has_one("pair", LinkSpec::new([("a", "x"), ("b", "y")])).as_array(true);

    let primary = plain(&[("a", int(1)), ("b", int(2))]);
    loader
        .populate_relation("pair", &relation, std::slice::from_ref(&primary))
        .unwrap();

    let related = primary.relation("pair").unwrap();
    assert!(!related.is_many());
    let record = related.one().unwrap();
    assert_eq!(record.attribute("val"), Some(Value::from("Z")));
    assert!(!record.is_structured());

    // Several primaries go through the bucket path instead of a single fetch.
    let first = plain(&[("a", int(1)), ("b", int(3))]);
    let second = plain(&[("a", int(1)), ("b", int(2))]);
    loader
        .populate_relation("pair", &relation, &[first.clone(), second.clone()])
        .unwrap();
    let val = |r: &RecordRef| r.relation("pair").unwrap().one().unwrap().attribute("val");
    assert_eq!(val(&first), Some(Value::from("W")));
    assert_eq!(val(&second), Some(Value::from("Z")));
}

#[test]
fn test_pivot_through_memberships() {
    let fx = directory();
    let users = fx.records("user");

    let relation = fx.relation("user", "groups");
    fx.loader.populate_relation("groups", &relation, &users).unwrap();

    let groups = users[0].relation("groups").unwrap().records();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].attribute("id"), Some(int(5)));
    assert_eq!(groups[0].attribute("name"), Some(Value::from("Admins")));
    assert_eq!(related_ids(&users[1], "groups"), Vec::<i64>::new());
    assert_eq!(fx.db.query_count(), 2);
}

#[test]
fn test_unmatched_primary_gets_empty_value() {
    let fx = shop();
    let primaries = vec![plain(&[("id", int(1))]), plain(&[("id", int(99))])];
    fx.loader
        .populate_relation("orders", &orders_by_customer(), &primaries)
        .unwrap();

    assert!(matches!(
        primaries[1].relation("orders"),
        Some(Related::Many(ref records)) if records.is_empty()
    ));

    let profile = RelationDescriptor::has_one("profile", LinkSpec::single("id", "customer_id"));
    fx.loader
        .populate_relation("profile", &profile, &primaries)
        .unwrap();
    assert!(primaries[0].relation("profile").unwrap().is_null());
    assert!(primaries[1].relation("profile").unwrap().is_null());
}

#[test]
fn test_null_keys_never_match() {
    let fx = shop();
    fx.db.insert(
        "order",
        Row::from_pairs([("id", Value::BigInt(13)), ("customer_id", Value::Null)]),
    );

    let primaries = vec![plain(&[("id", Value::Null)]), plain(&[("id", int(2))])];
    let related = fx
        .loader
        .populate_relation("orders", &orders_by_customer(), &primaries)
        .unwrap();

    assert_eq!(ids_of(&related), vec![12]);
    assert_eq!(related_ids(&primaries[0], "orders"), Vec::<i64>::new());
    assert_eq!(related_ids(&primaries[1], "orders"), vec![12]);

    // The bucketizer itself refuses to file a null-keyed dependent.
    let orphan = plain(&[("id", int(13)), ("customer_id", Value::Null)]);
    let buckets = build_buckets(
        &[orphan],
        &LinkSpec::single("id", "customer_id"),
        None,
        false,
        &LoaderConfig::default(),
    );
    assert!(buckets.is_empty());
}

#[test]
fn test_all_null_primaries_skip_the_query() {
    let fx = shop();
    let primaries = vec![plain(&[("id", Value::Null)]), plain(&[("name", Value::from("x"))])];

    let related = fx
        .loader
        .populate_relation("orders", &orders_by_customer(), &primaries)
        .unwrap();

    assert!(related.is_empty());
    assert_eq!(fx.db.query_count(), 0);
    for primary in &primaries {
        assert!(primary.relation("orders").unwrap().is_empty());
    }
}

#[test]
fn test_to_one_overflow_keeps_first_row() {
    let fx = shop();
    let primaries = vec![plain(&[("customer_id", int(1))]), plain(&[("customer_id", int(2))])];
    let latest = RelationDescriptor::has_one("order", LinkSpec::single("customer_id", "customer_id"))
        .order_by(OrderBy::desc("id"));

    fx.loader.populate_relation("latest", &latest, &primaries).unwrap();

    let id = |r: &RecordRef| r.relation("latest").unwrap().one().unwrap().attribute("id");
    assert_eq!(id(&primaries[0]), Some(int(11)));
    assert_eq!(id(&primaries[1]), Some(int(12)));
}

#[test]
fn test_mixed_integer_widths_match() {
    let fx = shop();
    let primaries = vec![plain(&[("id", Value::Int(1))]), plain(&[("id", Value::SmallInt(2))])];
    fx.loader
        .populate_relation("orders", &orders_by_customer(), &primaries)
        .unwrap();
    assert_eq!(related_ids(&primaries[0], "orders"), vec![10, 11]);
    assert_eq!(related_ids(&primaries[1], "orders"), vec![12]);
}
