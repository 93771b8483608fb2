use actix_web::{web, HttpResponse};
use serde::Serialize;
use serde_json::json;

use crate::access::Caller;
use crate::catalog::Catalog;
use crate::error::AppError;
use crate::identity::IdentityStore;
use crate::middleware::AuthMiddleware;
use crate::models::{
    LoginInput, NewProduct, PasswordUpdate, ProductFilter, ProductUpdate, ProfileUpdate,
    RegisterInput,
};

type Response = Result<HttpResponse, AppError>;

fn data<T: Serialize>(value: T) -> serde_json::Value {
    json!({ "success": true, "data": value })
}

fn listing<T: Serialize>(items: &[T]) -> serde_json::Value {
    json!({ "success": true, "count": items.len(), "data": items })
}

async fn register(identity: web::Data<IdentityStore>, input: web::Json<RegisterInput>) -> Response {
    let registered = identity.register(input.into_inner()).await?;
    Ok(HttpResponse::Created().json(data(registered)))
}

async fn login(identity: web::Data<IdentityStore>, input: web::Json<LoginInput>) -> Response {
    let session = identity.login(input.into_inner()).await?;
    Ok(HttpResponse::Ok().json(data(session)))
}

async fn logout(identity: web::Data<IdentityStore>, caller: Caller) -> Response {
    identity.logout(&caller).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "message": "Logged out successfully" })))
}

async fn me(identity: web::Data<IdentityStore>, caller: Caller) -> Response {
    let profile = identity.profile(&caller).await?;
    Ok(HttpResponse::Ok().json(data(profile)))
}

async fn dashboard(catalog: web::Data<Catalog>, caller: Caller) -> Response {
    let stats = catalog.dashboard(&caller).await?;
    Ok(HttpResponse::Ok().json(data(stats)))
}

async fn update_details(
    identity: web::Data<IdentityStore>,
    caller: Caller,
    update: web::Json<ProfileUpdate>,
) -> Response {
    let profile = identity.update_profile(&caller, update.into_inner()).await?;
    Ok(HttpResponse::Ok().json(data(profile)))
}

async fn update_password(
    identity: web::Data<IdentityStore>,
    caller: Caller,
    update: web::Json<PasswordUpdate>,
) -> Response {
    let profile = identity.update_password(&caller, update.into_inner()).await?;
    Ok(HttpResponse::Ok().json(data(profile)))
}

async fn own_products(catalog: web::Data<Catalog>, caller: Caller) -> Response {
    let products = catalog.list_owned(&caller).await?;
    Ok(HttpResponse::Ok().json(listing(&products)))
}

async fn own_product(
    catalog: web::Data<Catalog>,
    caller: Caller,
    product_id: web::Path<String>,
) -> Response {
    let product = catalog.get_owned(&caller, &product_id).await?;
    Ok(HttpResponse::Ok().json(data(product)))
}

async fn add_product(
    catalog: web::Data<Catalog>,
    caller: Caller,
    input: web::Json<NewProduct>,
) -> Response {
    let product = catalog.create(&caller, input.into_inner()).await?;
    Ok(HttpResponse::Created().json(data(product)))
}

async fn update_product(
    catalog: web::Data<Catalog>,
    caller: Caller,
    product_id: web::Path<String>,
    update: web::Json<ProductUpdate>,
) -> Response {
    let product = catalog
        .update(&caller, &product_id, update.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(data(product)))
}

async fn delete_product(
    catalog: web::Data<Catalog>,
    caller: Caller,
    product_id: web::Path<String>,
) -> Response {
    let product = catalog.delete(&caller, &product_id).await?;
    Ok(HttpResponse::Ok().json(data(product)))
}

async fn products(catalog: web::Data<Catalog>, filter: web::Query<ProductFilter>) -> Response {
    let products = catalog.list(&filter).await?;
    Ok(HttpResponse::Ok().json(listing(&products)))
}

async fn product(catalog: web::Data<Catalog>, product_id: web::Path<String>) -> Response {
    let product = catalog.get(&product_id).await?;
    Ok(HttpResponse::Ok().json(data(product)))
}

/// Extractor failures (bad JSON body, query or path) answer with the same
/// validation envelope as the services do.
fn extractor_errors(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| AppError::validation(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| AppError::validation(err.to_string()).into()),
    )
    .app_data(
        web::PathConfig::default()
            .error_handler(|err, _req| AppError::validation(err.to_string()).into()),
    );
}

/// Registers every route. Expects `web::Data<IdentityStore>` and
/// `web::Data<Catalog>` to be shared with the app.
pub fn configure(identity: web::Data<IdentityStore>) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg| {
        extractor_errors(cfg);

        // Guarded per resource so unknown paths under the scope stay 404.
        let protected =
            |path: &str| web::resource(path).wrap(AuthMiddleware::new(identity.clone()));

        cfg.service(
            web::scope("/api/vendors")
                .route("/register", web::post().to(register))
                .route("/login", web::post().to(login))
                .service(protected("/logout").route(web::get().to(logout)))
                .service(protected("/me").route(web::get().to(me)))
                .service(protected("/dashboard").route(web::get().to(dashboard)))
                .service(protected("/updatedetails").route(web::put().to(update_details)))
                .service(protected("/updatepassword").route(web::put().to(update_password))),
        )
        .service(
            web::scope("/api/vendor-products")
                .wrap(AuthMiddleware::new(identity.clone()))
                .route("", web::get().to(own_products))
                .route("", web::post().to(add_product))
                .route("/{id}", web::get().to(own_product))
                .route("/{id}", web::put().to(update_product))
                .route("/{id}", web::delete().to(delete_product)),
        )
        .service(
            web::scope("/api/products")
                .route("", web::get().to(products))
                .route("/{id}", web::get().to(product)),
        );
    }
}
