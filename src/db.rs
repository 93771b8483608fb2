use mongodb::bson::doc;
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, Database, IndexModel};

pub const VENDORS: &str = "vendors";
pub const PRODUCTS: &str = "products";
pub const COUNTERS: &str = "counters";

pub async fn connect(database_url: &str, database_name: &str) -> mongodb::error::Result<Database> {
    let mut client_options = ClientOptions::parse(database_url).await?;
    client_options.app_name = Some("vendor-catalog".to_string());

    let client = Client::with_options(client_options)?;
    let db = client.database(database_name);

    ensure_indexes(&db).await?;
    log::info!("connected to MongoDB database `{database_name}`");

    Ok(db)
}

/// Unique indexes backing the email and display-number invariants.
async fn ensure_indexes(db: &Database) -> mongodb::error::Result<()> {
    let unique = || IndexOptions::builder().unique(true).build();

    db.collection::<mongodb::bson::Document>(VENDORS)
        .create_index(
            IndexModel::builder()
                .keys(doc! { "email": 1 })
                .options(unique())
                .build(),
            None,
        )
        .await?;

    let products = db.collection::<mongodb::bson::Document>(PRODUCTS);
    products
        .create_index(
            IndexModel::builder()
                .keys(doc! { "numericId": 1 })
                .options(unique())
                .build(),
            None,
        )
        .await?;
    products
        .create_index(IndexModel::builder().keys(doc! { "ownerId": 1 }).build(), None)
        .await?;

    Ok(())
}
