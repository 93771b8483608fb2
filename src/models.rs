use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BusinessType {
    Manufacturer,
    Wholesaler,
    Distributor,
    Retailer,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub zip_code: Option<String>,
}

/// Vendor account as persisted. Never serialized to clients directly; see [`VendorProfile`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vendor {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
    pub password: String,
    pub company_name: String,
    pub business_type: BusinessType,
    #[serde(default)]
    pub address: Option<Address>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub tax_id: Option<String>,
    #[serde(default = "default_approved")]
    pub approved: bool,
    /// Ids (`jti`) of bearer tokens that are still accepted for this account.
    #[serde(default)]
    pub tokens: Vec<String>,
    #[serde(default)]
    pub products: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_approved() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub company_name: String,
    pub business_type: BusinessType,
    pub address: Option<Address>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub tax_id: Option<String>,
    pub approved: bool,
    pub products: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Vendor> for VendorProfile {
    fn from(vendor: Vendor) -> Self {
        VendorProfile {
            id: vendor.id,
            name: vendor.name,
            email: vendor.email,
            company_name: vendor.company_name,
            business_type: vendor.business_type,
            address: vendor.address,
            phone: vendor.phone,
            website: vendor.website,
            tax_id: vendor.tax_id,
            approved: vendor.approved,
            products: vendor.products,
            created_at: vendor.created_at,
            updated_at: vendor.updated_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterInput {
    pub name: String,
    pub email: String,
    pub password: String,
    pub company_name: String,
    pub business_type: BusinessType,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginInput {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Partial profile update. Password and identity fields are not accepted here.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub company_name: Option<String>,
    pub business_type: Option<BusinessType>,
    pub address: Option<Address>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub tax_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordUpdate {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub vendor_id: String,
    pub name: String,
    pub email: String,
    pub company_name: String,
    pub business_type: BusinessType,
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // vendor id
    pub jti: String, // token id, matched against Vendor::tokens
    pub iat: usize,
    pub exp: usize,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Counter {
    #[serde(rename = "_id")]
    pub id: String,
    pub seq: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(rename = "_id")]
    pub id: String,
    /// Catalog-wide display number, assigned once and never reused.
    pub numeric_id: i64,
    pub owner_id: String,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub stock: i64,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub stock: i64,
    pub image: Option<String>,
}

/// Partial product update. Unknown keys such as `ownerId` or `numericId` are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub stock: Option<i64>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductFilter {
    #[serde(rename = "vendor")]
    pub owner: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub products: u64,
}
