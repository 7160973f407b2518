//! In-Memory Catalog - the repository API without a database server
//!
//! This example demonstrates:
//! - Binding entities to in-memory relational and document backends
//! - Creating, searching, paging and updating records
//! - Credential stripping on user records
//! - Count and sum through the aggregate gateway
//!
//! ## Running the Example
//!
//! ```bash
//! cargo run --example in-memory-catalog
//! ```

use std::sync::Arc;

use marketplace_store::memory::{MemoryCollection, MemoryTable};
use marketplace_store::prelude::*;
use serde_json::{json, Value};

fn record(value: Value) -> Record {
    value.as_object().cloned().unwrap_or_default()
}

#[tokio::main]
async fn main() -> Result<()> {
    let products = Arc::new(MemoryTable::new(
        "products",
        ["id", "name", "description", "category", "vendor", "price", "createdAt", "updatedAt"],
    ));
    let users = Arc::new(MemoryCollection::new("users"));
    let orders = Arc::new(MemoryCollection::new("orders"));

    let store = Persistence::builder()
        .handle::<Products>(ModelHandle::relational(products))
        .handle::<Users>(ModelHandle::document(users))
        .handle::<Orders>(ModelHandle::document(orders))
        .build()
        .await?;

    let vendor = store
        .users()
        .create(record(json!({
            "name": "Northwind Outfitters",
            "email": "sales@northwind.example",
            "role": "vendor",
            "password": "correct horse battery staple",
        })))
        .await;
    println!("vendor: {}", serde_json::to_string_pretty(&vendor).unwrap_or_default());

    let vendor_id = vendor
        .data
        .as_ref()
        .and_then(|user| user.get("id"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    for (name, category, price) in [
        ("Chelsea boot", "shoes", 129.0),
        ("Hiking boot", "shoes", 179.0),
        ("Canvas sneaker", "shoes", 59.0),
        ("Wool scarf", "accessories", 35.0),
    ] {
        store
            .products()
            .create(record(json!({
                "name": name,
                "category": category,
                "vendor": vendor_id,
                "price": price,
            })))
            .await;
    }

    let boots = store
        .products()
        .get_all(
            &FilterDescription::new().eq("category", "shoes").eq("search", "boot"),
            PageRequest::new(1, 10),
        )
        .await;
    println!("boots: {}", serde_json::to_string_pretty(&boots).unwrap_or_default());

    let premium = FilterDescription::new().compare("price", FilterOperator::GreaterThanOrEqual, 100);
    println!("premium products: {}", store.count::<Products>(&premium).await);

    for (number, total) in [("A-1001", 129.0), ("A-1002", 238.0)] {
        store
            .orders()
            .create(record(json!({
                "orderNumber": number,
                "user": vendor_id,
                "status": "paid",
                "totalAmount": total,
            })))
            .await;
    }
    let paid = FilterDescription::new().eq("status", "paid");
    println!("paid revenue: {}", store.sum::<Orders>("totalAmount", &paid).await);

    let renamed = store
        .users()
        .update(&vendor_id, record(json!({"name": "Northwind", "password": "ignored"})))
        .await;
    println!("renamed: {}", serde_json::to_string_pretty(&renamed).unwrap_or_default());

    store.shutdown().await;
    Ok(())
}
