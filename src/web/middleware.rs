// plantpulse-ingest-core/src/web/middleware.rs
// Permissive CORS applied to every response

use std::future::{ready, Ready};

use actix_web::body::EitherBody;
use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::{self, HeaderValue};
use actix_web::http::Method;
use actix_web::{Error, HttpResponse};
use futures::future::LocalBoxFuture;

/// Adds `Access-Control-Allow-Origin: *` to every response and answers
/// preflight requests directly
pub struct PermissiveCors;

impl<S, B> Transform<S, ServiceRequest> for PermissiveCors
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = PermissiveCorsMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(PermissiveCorsMiddleware { service }))
    }
}

pub struct PermissiveCorsMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for PermissiveCorsMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if req.method() == Method::OPTIONS {
            let (req, _payload) = req.into_parts();
            let response = HttpResponse::Ok()
                .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
                .insert_header((header::ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, OPTIONS"))
                .insert_header((
                    header::ACCESS_CONTROL_ALLOW_HEADERS,
                    "Content-Type, Authorization, X-API-Key, X-Tenant-ID",
                ))
                .finish()
                .map_into_right_body();
            return Box::pin(async move { Ok(ServiceResponse::new(req, response)) });
        }

        let fut = self.service.call(req);
        Box::pin(async move {
            let mut res = fut.await?;
            res.headers_mut().insert(
                header::ACCESS_CONTROL_ALLOW_ORIGIN,
                HeaderValue::from_static("*"),
            );
            Ok(res.map_into_left_body())
        })
    }
}
