//! Product catalog scoped by vendor ownership.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::access::{authorize, Caller};
use crate::error::{AppError, Resource};
use crate::models::{DashboardStats, NewProduct, Product, ProductFilter, ProductUpdate};
use crate::store::{ProductStore, VendorStore, PRODUCT_SEQUENCE};

/// Prices carry at most cent precision.
const PRICE_SCALE: u32 = 2;

pub struct Catalog {
    products: Arc<dyn ProductStore>,
    vendors: Arc<dyn VendorStore>,
}

impl Catalog {
    pub fn new(products: Arc<dyn ProductStore>, vendors: Arc<dyn VendorStore>) -> Self {
        Catalog { products, vendors }
    }

    pub async fn create(&self, caller: &Caller, input: NewProduct) -> Result<Product, AppError> {
        validate_name(&input.name)?;
        validate_price(input.price)?;
        validate_stock(input.stock)?;

        let numeric_id = self.products.next_sequence(PRODUCT_SEQUENCE).await?;
        let now = Utc::now();

        let product = Product {
            id: Uuid::new_v4().to_string(),
            numeric_id,
            owner_id: caller.vendor_id.clone(),
            name: input.name,
            description: input.description,
            price: input.price,
            stock: input.stock,
            image: input.image,
            created_at: now,
            updated_at: now,
        };

        self.products.insert_product(&product).await?;

        if let Err(e) = self
            .vendors
            .attach_product(&caller.vendor_id, &product.id)
            .await
        {
            log::warn!(
                "product {} created but not added to vendor {}: {e}",
                product.id,
                caller.vendor_id
            );
        }

        Ok(product)
    }

    /// Public listing; with an owner filter it is that vendor's catalog.
    pub async fn list(&self, filter: &ProductFilter) -> Result<Vec<Product>, AppError> {
        Ok(self.products.list_products(filter.owner.as_deref()).await?)
    }

    /// The caller's own catalog. The owner filter is the ownership check.
    pub async fn list_owned(&self, caller: &Caller) -> Result<Vec<Product>, AppError> {
        Ok(self
            .products
            .list_products(Some(&caller.vendor_id))
            .await?)
    }

    pub async fn get(&self, id: &str) -> Result<Product, AppError> {
        self.products
            .find_product(id)
            .await?
            .ok_or(AppError::NotFound(Resource::Product))
    }

    pub async fn get_owned(&self, caller: &Caller, id: &str) -> Result<Product, AppError> {
        let product = self.get(id).await?;
        authorize(caller, &product.owner_id)?;
        Ok(product)
    }

    /// Partial update. Only the supplied fields are written, so concurrent
    /// updates of different fields do not overwrite each other.
    pub async fn update(
        &self,
        caller: &Caller,
        id: &str,
        update: ProductUpdate,
    ) -> Result<Product, AppError> {
        let product = self.get_owned(caller, id).await?;

        if let Some(name) = &update.name {
            validate_name(name)?;
        }
        if let Some(price) = update.price {
            validate_price(price)?;
        }
        if let Some(stock) = update.stock {
            validate_stock(stock)?;
        }

        // Guarded on owner too, so a concurrent delete surfaces as NotFound.
        self.products
            .update_product(&product.id, &product.owner_id, &update, Utc::now())
            .await?
            .ok_or(AppError::NotFound(Resource::Product))
    }

    /// Hard delete. Returns the removed record.
    pub async fn delete(&self, caller: &Caller, id: &str) -> Result<Product, AppError> {
        let product = self.get_owned(caller, id).await?;

        if !self
            .products
            .delete_product(&product.id, &product.owner_id)
            .await?
        {
            return Err(AppError::NotFound(Resource::Product));
        }

        if let Err(e) = self
            .vendors
            .detach_product(&caller.vendor_id, &product.id)
            .await
        {
            log::warn!(
                "product {} deleted but still listed on vendor {}: {e}",
                product.id,
                caller.vendor_id
            );
        }

        Ok(product)
    }

    pub async fn dashboard(&self, caller: &Caller) -> Result<DashboardStats, AppError> {
        let products = self.products.count_products(&caller.vendor_id).await?;
        Ok(DashboardStats { products })
    }
}

fn validate_name(name: &str) -> Result<(), AppError> {
    if name.trim().is_empty() {
        return Err(AppError::validation("name is required"));
    }
    Ok(())
}

fn validate_price(price: Decimal) -> Result<(), AppError> {
    if price.is_sign_negative() && !price.is_zero() {
        return Err(AppError::validation("price must not be negative"));
    }
    if price.normalize().scale() > PRICE_SCALE {
        return Err(AppError::validation("price must have at most two decimal places"));
    }
    Ok(())
}

fn validate_stock(stock: i64) -> Result<(), AppError> {
    if stock < 0 {
        return Err(AppError::validation("stock must not be negative"));
    }
    Ok(())
}
