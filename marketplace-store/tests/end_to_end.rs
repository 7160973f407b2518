//! Repository and aggregate behaviour across both dialects, driven through
//! `Persistence` with in-memory backends.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use marketplace_store::memory::{MemoryCollection, MemoryTable};
use marketplace_store::prelude::*;
use marketplace_store::translate::{normalize, to_document_filter, to_sql_where, ColumnSet};
use mongodb::bson::{doc, Bson, DateTime};
use serde_json::{json, Value};

const PRODUCT_COLUMNS: [&str; 7] = ["id", "name", "description", "category", "price", "createdAt", "updatedAt"];
const USER_COLUMNS: [&str; 7] = ["id", "name", "email", "role", "password", "createdAt", "updatedAt"];

fn record(value: Value) -> Record {
    value.as_object().cloned().unwrap_or_default()
}

async fn persistence_with(users: ModelHandle, products: ModelHandle) -> Persistence {
    Persistence::builder()
        .without_tracing()
        .handle::<Users>(users)
        .handle::<Products>(products)
        .build()
        .await
        .unwrap()
}

async fn boot_catalog() -> Arc<MemoryTable> {
    let table = Arc::new(MemoryTable::new("products", PRODUCT_COLUMNS));
    let boots = (1..=25).map(|day| {
        record(json!({
            "name": format!("Boot model {day}"),
            "category": "shoes",
            "price": 50 + day,
            "createdAt": format!("2024-01-{day:02}T00:00:00Z"),
        }))
    });
    let others = [
        record(json!({"name": "Running boot", "category": "sports", "createdAt": "2024-02-01T00:00:00Z"})),
        record(json!({"name": "Sandal", "category": "shoes", "createdAt": "2024-02-02T00:00:00Z"})),
    ];
    table.seed(boots.chain(others)).await;
    table
}

#[tokio::test]
async fn test_category_search_second_page() {
    let store = persistence_with(ModelHandle::none(), ModelHandle::relational(boot_catalog().await)).await;

    let filter = FilterDescription::new().eq("category", "shoes").eq("search", "boot");
    let page = store
        .products()
        .get_all(&filter, PageRequest::new(2, 10))
        .await
        .into_data()
        .unwrap();

    assert_eq!(page.pagination, PaginationResult { current: 2, pages: 3, total: 25 });
    assert_eq!(store.count::<Products>(&filter).await, page.pagination.total);
    assert_eq!(page.len(), 10);
    let dates: Vec<&str> = page
        .records
        .iter()
        .filter_map(|row| row.get("createdAt").and_then(Value::as_str))
        .collect();
    assert_eq!(dates.first(), Some(&"2024-01-15T00:00:00Z"));
    assert_eq!(dates.last(), Some(&"2024-01-06T00:00:00Z"));
}

#[tokio::test]
async fn test_pages_is_ceiling_of_total() {
    let store = persistence_with(ModelHandle::none(), ModelHandle::relational(boot_catalog().await)).await;

    for limit in [1, 4, 7, 10, 25, 30] {
        let page = store
            .products()
            .get_products_by_category("shoes", PageRequest::new(1, limit))
            .await
            .into_data()
            .unwrap();
        assert_eq!(page.pagination.total, 26);
        assert_eq!(page.pagination.pages, 26_u64.div_ceil(limit));
    }
}

#[tokio::test]
async fn test_empty_update_is_a_noop_in_both_dialects() {
    let table = Arc::new(MemoryTable::new("users", USER_COLUMNS));
    table
        .seed([record(json!({"id": 1, "name": "Ada", "email": "ada@example.com", "createdAt": "2024-01-01T00:00:00Z"}))])
        .await;
    let collection = Arc::new(MemoryCollection::new("products"));
    collection
        .seed([doc! {"_id": "p1", "name": "Lamp", "createdAt": "2024-01-01T00:00:00Z"}])
        .await;

    let store = persistence_with(ModelHandle::relational(table.clone()), ModelHandle::document(collection.clone())).await;

    let before_row = table.rows().await;
    let user = store.users().update("1", Record::new()).await;
    assert!(user.success);
    assert_eq!(user.data.unwrap()["name"], "Ada");
    assert_eq!(table.rows().await, before_row);

    let before_docs = collection.documents().await;
    let product = store.products().update("p1", Record::new()).await;
    assert!(product.success);
    assert_eq!(product.data.unwrap()["name"], "Lamp");
    assert_eq!(collection.documents().await, before_docs);
}

#[tokio::test]
async fn test_password_is_never_updated() {
    let table = Arc::new(MemoryTable::new("users", USER_COLUMNS));
    table
        .seed([record(json!({"id": 1, "name": "Ada", "password": "hash", "createdAt": "2024-01-01T00:00:00Z"}))])
        .await;
    let collection = Arc::new(MemoryCollection::new("users"));
    collection
        .seed([doc! {"_id": "u1", "name": "Bob", "password": "hash"}])
        .await;

    let relational = persistence_with(ModelHandle::relational(table.clone()), ModelHandle::none()).await;
    let updated = relational
        .users()
        .update("1", record(json!({"password": "x", "name": "y"})))
        .await;
    assert!(updated.success);
    let data = updated.data.unwrap();
    assert_eq!(data["name"], "y");
    assert!(!data.contains_key("password"));
    assert_eq!(table.rows().await[0]["password"], "hash");

    let document = persistence_with(ModelHandle::document(collection.clone()), ModelHandle::none()).await;
    let updated = document
        .users()
        .update("u1", record(json!({"password": "x", "name": "y"})))
        .await;
    assert!(updated.success);
    let stored = &collection.documents().await[0];
    assert_eq!(stored.get_str("name").unwrap(), "y");
    assert_eq!(stored.get_str("password").unwrap(), "hash");

    let degraded = persistence_with(ModelHandle::none(), ModelHandle::none()).await;
    let skipped = degraded
        .users()
        .update("1", record(json!({"password": "x", "name": "y"})))
        .await;
    assert!(skipped.success);
    assert!(skipped.data.is_none());
    assert_eq!(skipped.message.as_deref(), Some("User storage is unavailable"));
}

#[tokio::test]
async fn test_created_user_hides_credentials() {
    let table = Arc::new(MemoryTable::new("users", USER_COLUMNS));
    let store = persistence_with(ModelHandle::relational(table.clone()), ModelHandle::none()).await;

    let created = store
        .users()
        .create(record(json!({"name": "Cy", "email": "cy@example.com", "password": "secret", "role": "vendor"})))
        .await;
    assert!(created.success);
    let data = created.data.unwrap();
    assert!(!data.contains_key("password"));
    assert!(data.get("createdAt").is_some_and(Value::is_string));

    let found = store.users().get_user_by_email(" cy@example.com ").await;
    assert_eq!(found.data.unwrap()["name"], "Cy");

    let vendors = store
        .users()
        .get_users_by_role("vendor", PageRequest::default())
        .await;
    let json = serde_json::to_value(&vendors).unwrap();
    assert_eq!(json["data"]["users"][0]["email"], "cy@example.com");
    assert!(json["data"]["users"][0].get("password").is_none());
}

#[tokio::test]
async fn test_count_uses_counter_after_disable() {
    let table = Arc::new(MemoryTable::new("users", USER_COLUMNS));
    table
        .seed((0..3).map(|i| record(json!({"name": format!("user {i}")}))))
        .await;
    let store = persistence_with(ModelHandle::relational(table), ModelHandle::none()).await;
    store.counters().update_progress("users", 41.0);

    let any = FilterDescription::new().eq("role", "customer");
    assert_eq!(store.count::<Users>(&FilterDescription::new()).await, 3);

    store.counters().disable_db();
    assert_eq!(store.count::<Users>(&any).await, 41);
    assert_eq!(
        store.count::<Users>(&FilterDescription::new()).await as f64,
        store.counters().value("users")
    );
}

#[tokio::test]
async fn test_no_backend_lists_empty_products() {
    let store = persistence_with(ModelHandle::none(), ModelHandle::none()).await;

    let page = store
        .products()
        .get_all(&FilterDescription::new().eq("category", "shoes"), PageRequest::default())
        .await;
    assert_eq!(
        serde_json::to_value(&page).unwrap(),
        json!({"success": true, "data": {"products": [], "pagination": {"current": 1, "pages": 0, "total": 0}}})
    );
}

#[tokio::test]
async fn test_failing_backend_falls_back_to_counters() {
    let collection = Arc::new(MemoryCollection::new("orders"));
    collection
        .seed([doc! {"status": "paid", "totalAmount": 10.0}, doc! {"status": "paid", "totalAmount": 5.5}])
        .await;
    let store = Persistence::builder()
        .without_tracing()
        .handle::<Orders>(ModelHandle::document(collection.clone()))
        .build()
        .await
        .unwrap();
    store.counters().update_progress("revenue", 1000.0);

    let paid = FilterDescription::new().eq("status", "paid");
    assert_eq!(store.sum::<Orders>("totalAmount", &paid).await, 15.5);

    collection.set_failing(true);
    assert_eq!(store.sum::<Orders>("totalAmount", &paid).await, 1000.0);

    let listed = store.orders().get_orders_by_status("paid", PageRequest::default()).await;
    assert!(!listed.success);
    assert!(listed.error.is_some());
}

#[tokio::test]
async fn test_string_price_bound_is_numeric() {
    let store = persistence_with(ModelHandle::none(), ModelHandle::relational(boot_catalog().await)).await;

    let filter = FilterDescription::from_json(&json!({"category": "shoes", "price": {"gte": "70"}}));
    let page = store
        .products()
        .get_all(&filter, PageRequest::new(1, 50))
        .await
        .into_data()
        .unwrap();
    assert_eq!(page.pagination.total, 6);
    assert!(page.records.iter().all(|p| p["price"].as_f64().is_some_and(|price| price >= 70.0)));
    assert_eq!(store.count::<Products>(&filter).await, 6);
}

#[test]
fn test_date_range_translation() {
    let filter = FilterDescription::from_json(&json!({"createdAt": {"gte": "2024-01-01T00:00:00Z"}}));
    let normalized = normalize(&filter, &["createdAt"]);

    let expected = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    assert_eq!(
        to_document_filter(&normalized),
        doc! {"createdAt": {"$gte": Bson::DateTime(DateTime::from_millis(expected.timestamp_millis()))}}
    );

    let clause = to_sql_where(&normalized, &ColumnSet::new(["id", "email"]));
    assert!(clause.is_empty());
}

#[test]
fn test_unparsable_date_drops_clause() {
    let filter = FilterDescription::from_json(&json!({"createdAt": {"gte": "not-a-date"}}));
    let normalized = normalize(&filter, &["createdAt"]);

    assert!(!to_document_filter(&normalized).contains_key("createdAt"));
    assert!(to_sql_where(&normalized, &ColumnSet::new(["createdAt"])).is_empty());
}
