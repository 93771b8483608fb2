use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Product, ProductUpdate, ProfileUpdate, Vendor};
use crate::store::{ProductStore, StoreError, VendorStore};

/// Process-local store with the same guarantees as the MongoDB one. Every
/// operation holds the lock for its whole read-modify-write.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    vendors: Vec<Vendor>,
    products: Vec<Product>,
    counters: HashMap<String, i64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock cannot leave a half-applied write behind.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl State {
    fn vendor_mut(&mut self, id: &str) -> Option<&mut Vendor> {
        self.vendors.iter_mut().find(|v| v.id == id)
    }
}

#[async_trait]
impl VendorStore for MemoryStore {
    async fn insert_vendor(&self, vendor: &Vendor) -> Result<(), StoreError> {
        let mut state = self.lock();
        if state.vendors.iter().any(|v| v.email == vendor.email || v.id == vendor.id) {
            return Err(StoreError::Duplicate);
        }
        state.vendors.push(vendor.clone());
        Ok(())
    }

    async fn find_vendor(&self, id: &str) -> Result<Option<Vendor>, StoreError> {
        Ok(self.lock().vendors.iter().find(|v| v.id == id).cloned())
    }

    async fn find_vendor_by_email(&self, email: &str) -> Result<Option<Vendor>, StoreError> {
        Ok(self.lock().vendors.iter().find(|v| v.email == email).cloned())
    }

    async fn update_profile(
        &self,
        id: &str,
        update: &ProfileUpdate,
        at: DateTime<Utc>,
    ) -> Result<Option<Vendor>, StoreError> {
        let mut state = self.lock();

        if let Some(email) = &update.email {
            if state.vendors.iter().any(|v| v.id != id && &v.email == email) {
                return Err(StoreError::Duplicate);
            }
        }

        let Some(vendor) = state.vendor_mut(id) else {
            return Ok(None);
        };

        if let Some(name) = &update.name {
            vendor.name.clone_from(name);
        }
        if let Some(email) = &update.email {
            vendor.email.clone_from(email);
        }
        if let Some(company_name) = &update.company_name {
            vendor.company_name.clone_from(company_name);
        }
        if let Some(business_type) = update.business_type {
            vendor.business_type = business_type;
        }
        if update.address.is_some() {
            vendor.address.clone_from(&update.address);
        }
        if update.phone.is_some() {
            vendor.phone.clone_from(&update.phone);
        }
        if update.website.is_some() {
            vendor.website.clone_from(&update.website);
        }
        if update.tax_id.is_some() {
            vendor.tax_id.clone_from(&update.tax_id);
        }
        vendor.updated_at = at;

        Ok(Some(vendor.clone()))
    }

    async fn set_password(
        &self,
        id: &str,
        hash: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut state = self.lock();
        let Some(vendor) = state.vendor_mut(id) else {
            return Ok(false);
        };
        vendor.password = hash.to_string();
        vendor.tokens.clear();
        vendor.updated_at = at;
        Ok(true)
    }

    async fn add_token(&self, id: &str, token_id: &str) -> Result<bool, StoreError> {
        let mut state = self.lock();
        let Some(vendor) = state.vendor_mut(id) else {
            return Ok(false);
        };
        vendor.tokens.push(token_id.to_string());
        Ok(true)
    }

    async fn remove_token(&self, id: &str, token_id: &str) -> Result<bool, StoreError> {
        let mut state = self.lock();
        let Some(vendor) = state.vendor_mut(id) else {
            return Ok(false);
        };
        let before = vendor.tokens.len();
        vendor.tokens.retain(|t| t != token_id);
        Ok(vendor.tokens.len() != before)
    }

    async fn attach_product(&self, id: &str, product_id: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        if let Some(vendor) = state.vendor_mut(id) {
            if !vendor.products.iter().any(|p| p == product_id) {
                vendor.products.push(product_id.to_string());
            }
        }
        Ok(())
    }

    async fn detach_product(&self, id: &str, product_id: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        if let Some(vendor) = state.vendor_mut(id) {
            vendor.products.retain(|p| p != product_id);
        }
        Ok(())
    }
}

#[async_trait]
impl ProductStore for MemoryStore {
    async fn next_sequence(&self, name: &str) -> Result<i64, StoreError> {
        let mut state = self.lock();
        let seq = state.counters.entry(name.to_string()).or_insert(0);
        *seq += 1;
        Ok(*seq)
    }

    async fn ensure_sequence_at_least(&self, name: &str, floor: i64) -> Result<(), StoreError> {
        let mut state = self.lock();
        let seq = state.counters.entry(name.to_string()).or_insert(0);
        *seq = (*seq).max(floor);
        Ok(())
    }

    async fn max_numeric_id(&self) -> Result<i64, StoreError> {
        Ok(self
            .lock()
            .products
            .iter()
            .map(|p| p.numeric_id)
            .max()
            .unwrap_or(0))
    }

    async fn insert_product(&self, product: &Product) -> Result<(), StoreError> {
        let mut state = self.lock();
        if state
            .products
            .iter()
            .any(|p| p.id == product.id || p.numeric_id == product.numeric_id)
        {
            return Err(StoreError::Duplicate);
        }
        state.products.push(product.clone());
        Ok(())
    }

    async fn find_product(&self, id: &str) -> Result<Option<Product>, StoreError> {
        Ok(self.lock().products.iter().find(|p| p.id == id).cloned())
    }

    async fn list_products(&self, owner: Option<&str>) -> Result<Vec<Product>, StoreError> {
        let mut products: Vec<Product> = self
            .lock()
            .products
            .iter()
            .filter(|p| owner.map_or(true, |owner| p.owner_id == owner))
            .cloned()
            .collect();
        products.sort_by_key(|p| p.numeric_id);
        Ok(products)
    }

    async fn update_product(
        &self,
        id: &str,
        owner: &str,
        update: &ProductUpdate,
        at: DateTime<Utc>,
    ) -> Result<Option<Product>, StoreError> {
        let mut state = self.lock();
        let Some(product) = state
            .products
            .iter_mut()
            .find(|p| p.id == id && p.owner_id == owner)
        else {
            return Ok(None);
        };

        if let Some(name) = &update.name {
            product.name.clone_from(name);
        }
        if update.description.is_some() {
            product.description.clone_from(&update.description);
        }
        if let Some(price) = update.price {
            product.price = price;
        }
        if let Some(stock) = update.stock {
            product.stock = stock;
        }
        if update.image.is_some() {
            product.image.clone_from(&update.image);
        }
        product.updated_at = at;

        Ok(Some(product.clone()))
    }

    async fn delete_product(&self, id: &str, owner: &str) -> Result<bool, StoreError> {
        let mut state = self.lock();
        let before = state.products.len();
        state.products.retain(|p| !(p.id == id && p.owner_id == owner));
        Ok(state.products.len() != before)
    }

    async fn count_products(&self, owner: &str) -> Result<u64, StoreError> {
        let count = self
            .lock()
            .products
            .iter()
            .filter(|p| p.owner_id == owner)
            .count();
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{sync_product_sequence, PRODUCT_SEQUENCE};

    #[tokio::test]
    async fn sequence_starts_at_one_and_increments() {
        let store = MemoryStore::new();

        assert_eq!(store.next_sequence(PRODUCT_SEQUENCE).await.unwrap(), 1);
        assert_eq!(store.next_sequence(PRODUCT_SEQUENCE).await.unwrap(), 2);
        assert_eq!(store.next_sequence("other").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn sequence_floor_never_lowers_counter() {
        let store = MemoryStore::new();
        store.next_sequence(PRODUCT_SEQUENCE).await.unwrap();
        store.next_sequence(PRODUCT_SEQUENCE).await.unwrap();

        store.ensure_sequence_at_least(PRODUCT_SEQUENCE, 1).await.unwrap();
        assert_eq!(store.next_sequence(PRODUCT_SEQUENCE).await.unwrap(), 3);

        store.ensure_sequence_at_least(PRODUCT_SEQUENCE, 10).await.unwrap();
        assert_eq!(store.next_sequence(PRODUCT_SEQUENCE).await.unwrap(), 11);
    }

    #[tokio::test]
    async fn sync_on_empty_catalog_keeps_counter_at_zero() {
        let store = MemoryStore::new();

        assert_eq!(sync_product_sequence(&store).await.unwrap(), 0);
        assert_eq!(store.next_sequence(PRODUCT_SEQUENCE).await.unwrap(), 1);
    }
}
