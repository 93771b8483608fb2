//! Persistence contract used by the identity store and the catalog.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{Product, ProductUpdate, ProfileUpdate, Vendor};

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// Counter name used for product display numbers.
pub const PRODUCT_SEQUENCE: &str = "Product";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated")]
    Duplicate,

    #[error("database error: {0}")]
    Database(#[source] mongodb::error::Error),

    #[error("document encoding error: {0}")]
    Encoding(#[from] mongodb::bson::ser::Error),

    #[error("sequence `{0}` could not be advanced")]
    Sequence(String),
}

#[async_trait]
pub trait VendorStore: Send + Sync {
    /// Fails with [`StoreError::Duplicate`] when the email is taken.
    async fn insert_vendor(&self, vendor: &Vendor) -> Result<(), StoreError>;

    async fn find_vendor(&self, id: &str) -> Result<Option<Vendor>, StoreError>;

    async fn find_vendor_by_email(&self, email: &str) -> Result<Option<Vendor>, StoreError>;

    async fn update_profile(
        &self,
        id: &str,
        update: &ProfileUpdate,
        at: DateTime<Utc>,
    ) -> Result<Option<Vendor>, StoreError>;

    /// Replaces the password hash and clears every active token in one write.
    async fn set_password(
        &self,
        id: &str,
        hash: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn add_token(&self, id: &str, token_id: &str) -> Result<bool, StoreError>;

    async fn remove_token(&self, id: &str, token_id: &str) -> Result<bool, StoreError>;

    async fn attach_product(&self, id: &str, product_id: &str) -> Result<(), StoreError>;

    async fn detach_product(&self, id: &str, product_id: &str) -> Result<(), StoreError>;
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Atomically increments the named counter and returns the new value.
    async fn next_sequence(&self, name: &str) -> Result<i64, StoreError>;

    /// Raises the named counter to `floor` if it is below it.
    async fn ensure_sequence_at_least(&self, name: &str, floor: i64) -> Result<(), StoreError>;

    async fn max_numeric_id(&self) -> Result<i64, StoreError>;

    async fn insert_product(&self, product: &Product) -> Result<(), StoreError>;

    async fn find_product(&self, id: &str) -> Result<Option<Product>, StoreError>;

    /// Products ordered by display number, optionally restricted to one owner.
    async fn list_products(&self, owner: Option<&str>) -> Result<Vec<Product>, StoreError>;

    /// Sets only the supplied fields, and only while the product still belongs
    /// to `owner`. Returns the updated record, or `None` when nothing matched.
    async fn update_product(
        &self,
        id: &str,
        owner: &str,
        update: &ProductUpdate,
        at: DateTime<Utc>,
    ) -> Result<Option<Product>, StoreError>;

    async fn delete_product(&self, id: &str, owner: &str) -> Result<bool, StoreError>;

    async fn count_products(&self, owner: &str) -> Result<u64, StoreError>;
}

/// Lifts the counter to the current maximum display number, so a fresh counter
/// over existing data never hands out a number already in use.
pub async fn sync_product_sequence(products: &dyn ProductStore) -> Result<i64, StoreError> {
    let max = products.max_numeric_id().await?;
    products
        .ensure_sequence_at_least(PRODUCT_SEQUENCE, max)
        .await?;
    Ok(max)
}
