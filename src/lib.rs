//! Vendor accounts and vendor-owned product catalog served over actix-web.

pub mod access;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod middleware;
pub mod models;
pub mod password;
pub mod store;
pub mod token;
