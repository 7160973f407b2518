//! Entity-specific lookups
//!
//! Thin wrappers over [`Repository::get_all`] and [`Repository::find_one`]
//! with the field names each model uses. A blank argument matches nothing and
//! never reaches the backend.

use super::crud::Repository;
use super::entity::{Entity, Orders, Products, Users};
use super::filter::FilterDescription;
use super::pagination::PageRequest;
use super::traits::Record;
use crate::responses::{ListPage, ResultEnvelope};

pub type UserRepository = Repository<Users>;
pub type ProductRepository = Repository<Products>;
pub type OrderRepository = Repository<Orders>;

impl<E: Entity> Repository<E> {
    async fn list_where(&self, field: &str, value: &str, page: PageRequest) -> ResultEnvelope<ListPage> {
        let value = value.trim();
        if value.is_empty() {
            return self.empty_page(page);
        }
        self.get_all(&FilterDescription::new().eq(field, value), page)
            .await
    }
}

impl Repository<Users> {
    /// Users holding `role` (`customer`, `vendor`, `admin`)
    pub async fn get_users_by_role(&self, role: &str, page: PageRequest) -> ResultEnvelope<ListPage> {
        self.list_where("role", role, page).await
    }

    pub async fn get_user_by_email(&self, email: &str) -> ResultEnvelope<Record> {
        let email = email.trim();
        if email.is_empty() {
            return ResultEnvelope::not_found();
        }
        self.find_one(&FilterDescription::new().eq("email", email))
            .await
    }
}

impl Repository<Products> {
    pub async fn get_products_by_category(
        &self,
        category: &str,
        page: PageRequest,
    ) -> ResultEnvelope<ListPage> {
        self.list_where("category", category, page).await
    }

    /// Products listed by the vendor with `vendor_id`
    pub async fn get_products_by_vendor(
        &self,
        vendor_id: &str,
        page: PageRequest,
    ) -> ResultEnvelope<ListPage> {
        self.list_where("vendor", vendor_id, page).await
    }
}

impl Repository<Orders> {
    pub async fn get_orders_by_status(
        &self,
        status: &str,
        page: PageRequest,
    ) -> ResultEnvelope<ListPage> {
        self.list_where("status", status, page).await
    }

    /// Orders placed by the user with `user_id`
    pub async fn get_orders_by_user(
        &self,
        user_id: &str,
        page: PageRequest,
    ) -> ResultEnvelope<ListPage> {
        self.list_where("user", user_id, page).await
    }
}
