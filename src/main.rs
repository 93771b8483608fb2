use std::io;
use std::sync::Arc;

use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};

use vendor_catalog::catalog::Catalog;
use vendor_catalog::config::Config;
use vendor_catalog::db;
use vendor_catalog::handlers;
use vendor_catalog::identity::IdentityStore;
use vendor_catalog::store::{self, MemoryStore, MongoStore, ProductStore, VendorStore};
use vendor_catalog::token::TokenIssuer;

type Stores = (Arc<dyn VendorStore>, Arc<dyn ProductStore>);

async fn open_stores(config: &Config) -> io::Result<Stores> {
    match &config.database_url {
        Some(url) => {
            let database = db::connect(url, &config.database_name)
                .await
                .map_err(io::Error::other)?;
            let mongo = Arc::new(MongoStore::new(&database));
            let vendors: Arc<dyn VendorStore> = mongo.clone();
            let products: Arc<dyn ProductStore> = mongo;
            Ok((vendors, products))
        }
        None => {
            let memory = Arc::new(MemoryStore::new());
            let vendors: Arc<dyn VendorStore> = memory.clone();
            let products: Arc<dyn ProductStore> = memory;
            Ok((vendors, products))
        }
    }
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let config = Config::from_env().map_err(io::Error::other)?;
    log::debug!("loaded {config:?}");

    let (vendors, products) = open_stores(&config).await?;

    let max = store::sync_product_sequence(products.as_ref())
        .await
        .map_err(io::Error::other)?;
    log::info!("product display numbers continue after {max}");

    let identity = web::Data::new(IdentityStore::new(
        vendors.clone(),
        TokenIssuer::new(&config.jwt_secret, config.token_ttl),
    ));
    let catalog = web::Data::new(Catalog::new(products, vendors));

    log::info!("listening on {}", config.bind_addr);

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(identity.clone())
            .app_data(catalog.clone())
            .configure(handlers::configure(identity.clone()))
    })
    .bind(&config.bind_addr)?
    .run()
    .await
}
