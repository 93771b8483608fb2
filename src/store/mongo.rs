use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::TryStreamExt;
use mongodb::bson::{doc, to_bson, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{
    FindOneAndUpdateOptions, FindOneOptions, FindOptions, ReturnDocument, UpdateOptions,
};
use mongodb::{Collection, Database};

use crate::db::{COUNTERS, PRODUCTS, VENDORS};
use crate::models::{Counter, Product, ProductUpdate, ProfileUpdate, Vendor};
use crate::store::{ProductStore, StoreError, VendorStore};

const DUPLICATE_KEY: i32 = 11000;

/// Concurrent upserts of a missing counter can race on `_id`; one of them wins
/// and the others retry against the now-existing document.
const SEQUENCE_ATTEMPTS: usize = 3;

impl From<mongodb::error::Error> for StoreError {
    fn from(error: mongodb::error::Error) -> Self {
        if is_duplicate_key(&error) {
            StoreError::Duplicate
        } else {
            StoreError::Database(error)
        }
    }
}

fn is_duplicate_key(error: &mongodb::error::Error) -> bool {
    match error.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == DUPLICATE_KEY,
        ErrorKind::Command(e) => e.code == DUPLICATE_KEY,
        _ => false,
    }
}

#[derive(Clone, Debug)]
pub struct MongoStore {
    vendors: Collection<Vendor>,
    products: Collection<Product>,
    counters: Collection<Counter>,
}

impl MongoStore {
    pub fn new(db: &Database) -> Self {
        MongoStore {
            vendors: db.collection(VENDORS),
            products: db.collection(PRODUCTS),
            counters: db.collection(COUNTERS),
        }
    }
}

fn profile_changes(update: &ProfileUpdate, at: DateTime<Utc>) -> Result<Document, StoreError> {
    let mut set = Document::new();

    if let Some(name) = &update.name {
        set.insert("name", name);
    }
    if let Some(email) = &update.email {
        set.insert("email", email);
    }
    if let Some(company_name) = &update.company_name {
        set.insert("companyName", company_name);
    }
    if let Some(business_type) = &update.business_type {
        set.insert("businessType", to_bson(business_type)?);
    }
    if let Some(address) = &update.address {
        set.insert("address", to_bson(address)?);
    }
    if let Some(phone) = &update.phone {
        set.insert("phone", phone);
    }
    if let Some(website) = &update.website {
        set.insert("website", website);
    }
    if let Some(tax_id) = &update.tax_id {
        set.insert("taxId", tax_id);
    }
    set.insert("updatedAt", to_bson(&at)?);

    Ok(set)
}

fn product_changes(update: &ProductUpdate, at: DateTime<Utc>) -> Result<Document, StoreError> {
    let mut set = Document::new();

    if let Some(name) = &update.name {
        set.insert("name", name);
    }
    if let Some(description) = &update.description {
        set.insert("description", description);
    }
    if let Some(price) = &update.price {
        set.insert("price", to_bson(price)?);
    }
    if let Some(stock) = update.stock {
        set.insert("stock", stock);
    }
    if let Some(image) = &update.image {
        set.insert("image", image);
    }
    set.insert("updatedAt", to_bson(&at)?);

    Ok(set)
}

#[async_trait]
impl VendorStore for MongoStore {
    async fn insert_vendor(&self, vendor: &Vendor) -> Result<(), StoreError> {
        self.vendors.insert_one(vendor, None).await?;
        Ok(())
    }

    async fn find_vendor(&self, id: &str) -> Result<Option<Vendor>, StoreError> {
        Ok(self.vendors.find_one(doc! { "_id": id }, None).await?)
    }

    async fn find_vendor_by_email(&self, email: &str) -> Result<Option<Vendor>, StoreError> {
        Ok(self.vendors.find_one(doc! { "email": email }, None).await?)
    }

    async fn update_profile(
        &self,
        id: &str,
        update: &ProfileUpdate,
        at: DateTime<Utc>,
    ) -> Result<Option<Vendor>, StoreError> {
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let changes = profile_changes(update, at)?;
        Ok(self
            .vendors
            .find_one_and_update(doc! { "_id": id }, doc! { "$set": changes }, options)
            .await?)
    }

    async fn set_password(
        &self,
        id: &str,
        hash: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let updated_at = to_bson(&at)?;
        let update = doc! {
            "$set": {
                "password": hash,
                "tokens": [],
                "updatedAt": updated_at,
            }
        };
        let result = self.vendors.update_one(doc! { "_id": id }, update, None).await?;
        Ok(result.matched_count == 1)
    }

    async fn add_token(&self, id: &str, token_id: &str) -> Result<bool, StoreError> {
        let result = self
            .vendors
            .update_one(doc! { "_id": id }, doc! { "$push": { "tokens": token_id } }, None)
            .await?;
        Ok(result.matched_count == 1)
    }

    async fn remove_token(&self, id: &str, token_id: &str) -> Result<bool, StoreError> {
        let result = self
            .vendors
            .update_one(doc! { "_id": id }, doc! { "$pull": { "tokens": token_id } }, None)
            .await?;
        Ok(result.modified_count == 1)
    }

    async fn attach_product(&self, id: &str, product_id: &str) -> Result<(), StoreError> {
        self.vendors
            .update_one(
                doc! { "_id": id },
                doc! { "$addToSet": { "products": product_id } },
                None,
            )
            .await?;
        Ok(())
    }

    async fn detach_product(&self, id: &str, product_id: &str) -> Result<(), StoreError> {
        self.vendors
            .update_one(
                doc! { "_id": id },
                doc! { "$pull": { "products": product_id } },
                None,
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ProductStore for MongoStore {
    async fn next_sequence(&self, name: &str) -> Result<i64, StoreError> {
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();

        for _ in 0..SEQUENCE_ATTEMPTS {
            let result = self
                .counters
                .find_one_and_update(
                    doc! { "_id": name },
                    doc! { "$inc": { "seq": 1_i64 } },
                    options.clone(),
                )
                .await;

            match result {
                Ok(Some(counter)) => return Ok(counter.seq),
                Ok(None) => break,
                Err(e) if is_duplicate_key(&e) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(StoreError::Sequence(name.to_string()))
    }

    async fn ensure_sequence_at_least(&self, name: &str, floor: i64) -> Result<(), StoreError> {
        let options = UpdateOptions::builder().upsert(true).build();
        self.counters
            .update_one(doc! { "_id": name }, doc! { "$max": { "seq": floor } }, options)
            .await?;
        Ok(())
    }

    async fn max_numeric_id(&self) -> Result<i64, StoreError> {
        let options = FindOneOptions::builder()
            .sort(doc! { "numericId": -1 })
            .build();
        let latest = self.products.find_one(doc! {}, options).await?;
        Ok(latest.map_or(0, |product| product.numeric_id))
    }

    async fn insert_product(&self, product: &Product) -> Result<(), StoreError> {
        self.products.insert_one(product, None).await?;
        Ok(())
    }

    async fn find_product(&self, id: &str) -> Result<Option<Product>, StoreError> {
        Ok(self.products.find_one(doc! { "_id": id }, None).await?)
    }

    async fn list_products(&self, owner: Option<&str>) -> Result<Vec<Product>, StoreError> {
        let filter = match owner {
            Some(owner) => doc! { "ownerId": owner },
            None => doc! {},
        };
        let options = FindOptions::builder().sort(doc! { "numericId": 1 }).build();

        let cursor = self.products.find(filter, options).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn update_product(
        &self,
        id: &str,
        owner: &str,
        update: &ProductUpdate,
        at: DateTime<Utc>,
    ) -> Result<Option<Product>, StoreError> {
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let changes = product_changes(update, at)?;
        Ok(self
            .products
            .find_one_and_update(
                doc! { "_id": id, "ownerId": owner },
                doc! { "$set": changes },
                options,
            )
            .await?)
    }

    async fn delete_product(&self, id: &str, owner: &str) -> Result<bool, StoreError> {
        let result = self
            .products
            .delete_one(doc! { "_id": id, "ownerId": owner }, None)
            .await?;
        Ok(result.deleted_count == 1)
    }

    async fn count_products(&self, owner: &str) -> Result<u64, StoreError> {
        Ok(self
            .products
            .count_documents(doc! { "ownerId": owner }, None)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use mongodb::bson::{from_document, Bson};
    use mongodb::error::{Error, WriteError};
    use rust_decimal::Decimal;
    use testresult::TestResult;

    use super::*;

    fn write_error(code: i32) -> Result<Error, mongodb::bson::de::Error> {
        let failure: WriteError = from_document(doc! { "code": code, "errmsg": "write failed" })?;
        Ok(Error::from(ErrorKind::Write(WriteFailure::WriteError(failure))))
    }

    #[test]
    fn duplicate_key_write_maps_to_duplicate() -> TestResult {
        assert!(is_duplicate_key(&write_error(DUPLICATE_KEY)?));
        assert!(matches!(
            StoreError::from(write_error(DUPLICATE_KEY)?),
            StoreError::Duplicate
        ));

        Ok(())
    }

    #[test]
    fn other_failures_stay_database_errors() -> TestResult {
        assert!(!is_duplicate_key(&write_error(121)?));
        assert!(!is_duplicate_key(&Error::custom("connection reset")));
        assert!(matches!(
            StoreError::from(Error::custom("connection reset")),
            StoreError::Database(_)
        ));

        Ok(())
    }

    #[test]
    fn profile_changes_set_only_supplied_fields() -> TestResult {
        let at = Utc::now();
        let update = ProfileUpdate {
            name: Some("Grace".to_string()),
            phone: Some("555-0100".to_string()),
            ..ProfileUpdate::default()
        };

        let set = profile_changes(&update, at)?;

        let mut keys: Vec<_> = set.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, ["name", "phone", "updatedAt"]);
        assert_eq!(set.get_str("name")?, "Grace");
        assert_eq!(set.get("updatedAt"), Some(&to_bson(&at)?));

        Ok(())
    }

    #[test]
    fn product_changes_set_only_supplied_fields() -> TestResult {
        let at = Utc::now();
        let price = Decimal::from_str("5.00")?;
        let update = ProductUpdate {
            price: Some(price),
            stock: Some(3),
            ..ProductUpdate::default()
        };

        let set = product_changes(&update, at)?;

        let mut keys: Vec<_> = set.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, ["price", "stock", "updatedAt"]);
        assert_eq!(set.get("price"), Some(&to_bson(&price)?));
        assert_eq!(set.get("stock"), Some(&Bson::Int64(3)));

        Ok(())
    }
}
