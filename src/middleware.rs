use actix_service::{forward_ready, Service};
use actix_web::dev::{ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::AUTHORIZATION;
use actix_web::{web, Error, HttpMessage};
use futures::future::{ok, LocalBoxFuture, Ready};
use std::rc::Rc;

use crate::access::AccessState;
use crate::identity::IdentityStore;

/// Resolves the bearer token on every request in the wrapped scope and stores
/// the verified [`crate::access::Caller`] in the request extensions.
pub struct AuthMiddleware {
    identity: web::Data<IdentityStore>,
}

impl AuthMiddleware {
    pub fn new(identity: web::Data<IdentityStore>) -> Self {
        AuthMiddleware { identity }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = AuthMiddlewareService<S>;
    type InitError = ();

    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddlewareService {
            service: Rc::new(service),
            identity: self.identity.clone(),
        })
    }
}

pub struct AuthMiddlewareService<S> {
    service: Rc<S>,
    identity: web::Data<IdentityStore>,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let identity = self.identity.clone();
        let service = self.service.clone();

        Box::pin(async move {
            let state = AccessState::Unauthenticated
                .present(req.headers().get(AUTHORIZATION))
                .verify(&identity)
                .await?;

            match state.into_caller() {
                Ok(caller) => {
                    req.extensions_mut().insert(caller);
                    service.call(req).await
                }
                Err(rejection) => {
                    log::info!("{} {} rejected: {rejection}", req.method(), req.path());
                    Err(rejection.into())
                }
            }
        })
    }
}
