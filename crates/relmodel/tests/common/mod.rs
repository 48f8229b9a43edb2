//! Shared fixtures: a small shop and a user/group directory.

#![allow(dead_code)]

use relmodel::prelude::*;

pub fn shop_registry() -> Registry {
    let orders = RelationDescriptor::has_many("order", LinkSpec::single("id", "customer_id"));
    let order_items =
        RelationDescriptor::has_many("order_item", LinkSpec::single("id", "order_id"))
            .via_relation("orders", orders.clone());

    Registry::new()
        .with(
            ModelSchema::new("customer")
                .with_relation("orders", orders.clone().inverse_of("customer"))
                .with_relation(
                    "profile",
                    RelationDescriptor::has_one("profile", LinkSpec::single("id", "customer_id")),
                )
                .with_relation("order_items", order_items.clone())
                .with_relation(
                    "items",
                    RelationDescriptor::has_many("item", LinkSpec::single("item_id", "id"))
                        .via_relation("order_items", order_items),
                ),
        )
        .with(
            ModelSchema::new("order")
                .with_relation(
                    "customer",
                    RelationDescriptor::has_one("customer", LinkSpec::single("customer_id", "id"))
                        .inverse_of("orders"),
                )
                .with_relation(
                    "items",
                    RelationDescriptor::has_many("item", LinkSpec::single("item_id", "id"))
                        .via_table("order_item", LinkSpec::single("id", "order_id"))
                        .order_by(OrderBy::asc("id")),
                ),
        )
        .with(ModelSchema::new("item"))
        .with(ModelSchema::new("profile"))
        .with(ModelSchema::new("order_item").with_primary_key(["order_id", "item_id"]))
}

pub fn shop_db() -> MemoryExecutor {
    let db = MemoryExecutor::new();
    db.load_json(
        "customer",
        &serde_json::json!([
            {"id": 1, "name": "Alice"},
            {"id": 2, "name": "Bob"},
            {"id": 3, "name": "Carol"}
        ]),
    )
    .unwrap();
    db.load_json(
        "order",
        &serde_json::json!([
            {"id": 10, "customer_id": 1, "total": 5},
            {"id": 11, "customer_id": 1, "total": 7},
            {"id": 12, "customer_id": 2, "total": 3}
        ]),
    )
    .unwrap();
    db.load_json(
        "item",
        &serde_json::json!([
            {"id": 100, "name": "pen"},
            {"id": 101, "name": "ink"},
            {"id": 102, "name": "pad"}
        ]),
    )
    .unwrap();
    db.load_json(
        "order_item",
        &serde_json::json!([
            {"order_id": 10, "item_id": 100},
            {"order_id": 10, "item_id": 101},
            {"order_id": 11, "item_id": 101},
            {"order_id": 12, "item_id": 102}
        ]),
    )
    .unwrap();
    db.load_json(
        "profile",
        &serde_json::json!([{"id": 500, "customer_id": 2, "bio": "hi"}]),
    )
    .unwrap();
    db
}

pub struct Fixture {
    pub db: Arc<MemoryExecutor>,
    pub loader: RelationLoader,
}

pub fn shop() -> Fixture {
    let db = Arc::new(shop_db());
    let loader = RelationLoader::new(
        Arc::new(shop_registry()),
        Arc::clone(&db) as Arc<dyn Executor>,
    );
    Fixture { db, loader }
}

impl Fixture {
    /// Every customer, hydrated as structured records. Resets the query log.
    pub fn customers(&self) -> Vec<RecordRef> {
        self.records("customer")
    }

    /// Every record of `kind` in id order. Resets the query log.
    pub fn records(&self, kind: &str) -> Vec<RecordRef> {
        let records = find(&self.loader, kind)
            .order_by(OrderBy::asc("id"))
            .all()
            .unwrap();
        self.db.reset();
        records
    }

    pub fn relation(&self, kind: &str, name: &str) -> RelationDescriptor {
        self.loader
            .registry()
            .schema(kind)
            .unwrap()
            .relation(name)
            .unwrap()
            .clone()
    }
}

pub fn directory_registry() -> Registry {
    let memberships = RelationDescriptor::has_many("membership", LinkSpec::single("id", "user_id"));
    Registry::new()
        .with(
            ModelSchema::new("user")
                .with_relation("memberships", memberships.clone())
                .with_relation(
                    "groups",
                    RelationDescriptor::has_many("group", LinkSpec::single("group_id", "id"))
                        .via_relation("memberships", memberships),
                ),
        )
        .with(ModelSchema::new("membership").with_primary_key(["user_id", "group_id"]))
        .with(ModelSchema::new("group"))
}

/// Users 1 and 2; user 1 belongs to group 5 only.
pub fn directory() -> Fixture {
    let db = MemoryExecutor::new();
    db.load_json("user", &serde_json::json!([{"id": 1}, {"id": 2}]))
        .unwrap();
    db.load_json(
        "membership",
        &serde_json::json!([{"user_id": 1, "group_id": 5}]),
    )
    .unwrap();
    db.load_json(
        "group",
        &serde_json::json!([{"id": 5, "name": "Admins"}, {"id": 6, "name": "Guests"}]),
    )
    .unwrap();
    let db = Arc::new(db);
    let loader = RelationLoader::new(
        Arc::new(directory_registry()),
        Arc::clone(&db) as Arc<dyn Executor>,
    );
    Fixture { db, loader }
}

pub fn plain(pairs: &[(&str, Value)]) -> RecordRef {
    let mut record = PlainRecord::new();
    for (k, v) in pairs {
        record.set_attribute(k, v.clone());
    }
    RecordRef::new(record)
}

pub fn int(v: i64) -> Value {
    Value::BigInt(v)
}

pub fn ids_of(records: &[RecordRef]) -> Vec<i64> {
    records
        .iter()
        .filter_map(|r| r.get::<i64>("id").ok())
        .collect()
}

pub fn related_ids(record: &RecordRef, relation: &str) -> Vec<i64> {
    ids_of(&record.relation(relation).unwrap_or_default().records())
}
