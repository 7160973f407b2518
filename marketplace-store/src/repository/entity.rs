//! Entity descriptors
//!
//! An [`Entity`] is a zero-sized marker naming one stored model and the
//! per-model knobs a [`Repository`](super::Repository) needs. There are three:
//! [`Users`], [`Products`] and [`Orders`].

use crate::degraded::CounterKey;
use crate::translate::DEFAULT_DATE_FIELDS;

/// Fields that carry credentials
pub const CREDENTIAL_FIELDS: &[&str] = &["password", "passwordHash"];

/// Fields an update may never change
pub const IMMUTABLE_FIELDS: &[&str] = &["id", "_id", "createdAt"];

/// Static description of a stored model
pub trait Entity: Send + Sync + 'static {
    /// Singular name used in logs and errors (`User`)
    const NAME: &'static str;

    /// Plural name used as the list key (`users`)
    const PLURAL: &'static str;

    /// Counter answering for this entity in degraded mode
    const COUNTER: CounterKey;

    /// Fields the `search` term is matched against
    const SEARCH_FIELDS: &'static [&'static str];

    /// Fields whose filter values are coerced to timestamps
    const DATE_FIELDS: &'static [&'static str] = DEFAULT_DATE_FIELDS;

    /// Fields removed from every record leaving the repository
    const HIDDEN_FIELDS: &'static [&'static str] = &[];
}

/// Marketplace accounts: customers, vendors and admins
#[derive(Debug, Clone, Copy, Default)]
pub struct Users;

impl Entity for Users {
    const NAME: &'static str = "User";
    const PLURAL: &'static str = "users";
    const COUNTER: CounterKey = CounterKey::Users;
    const SEARCH_FIELDS: &'static [&'static str] = &["name", "email"];
    const DATE_FIELDS: &'static [&'static str] = &["createdAt", "updatedAt", "lastLoginAt"];
    const HIDDEN_FIELDS: &'static [&'static str] = CREDENTIAL_FIELDS;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Products;

impl Entity for Products {
    const NAME: &'static str = "Product";
    const PLURAL: &'static str = "products";
    const COUNTER: CounterKey = CounterKey::Products;
    const SEARCH_FIELDS: &'static [&'static str] = &["name", "description"];
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Orders;

impl Entity for Orders {
    const NAME: &'static str = "Order";
    const PLURAL: &'static str = "orders";
    const COUNTER: CounterKey = CounterKey::Orders;
    const SEARCH_FIELDS: &'static [&'static str] = &["orderNumber"];
    const DATE_FIELDS: &'static [&'static str] = &["createdAt", "updatedAt", "deliveredAt"];
}
