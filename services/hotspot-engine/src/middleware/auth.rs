use crate::auth::{Claims, TokenService};
use crate::errors::ApiError;
use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::AUTHORIZATION,
    Error, FromRequest, HttpMessage, HttpRequest, ResponseError,
};
use futures_util::future::LocalBoxFuture;
use std::future::{ready, Ready};
use std::rc::Rc;

/// Rejects requests without a valid `Authorization: Bearer <token>` header.
///
/// Verified claims are stored in the request extensions and can be read by
/// handlers through [`AuthenticatedUser`].
#[derive(Clone)]
pub struct JwtAuth {
    tokens: TokenService,
}

impl JwtAuth {
    pub fn new(tokens: TokenService) -> Self {
        Self { tokens }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = JwtAuthMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(JwtAuthMiddleware {
            service: Rc::new(service),
            tokens: self.tokens.clone(),
        }))
    }
}

pub struct JwtAuthMiddleware<S> {
    service: Rc<S>,
    tokens: TokenService,
}

fn bearer_token(req: &ServiceRequest) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

impl<S, B> Service<ServiceRequest> for JwtAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let verified = match bearer_token(&req) {
            Some(token) => self.tokens.verify(token).map_err(|err| err.to_string()),
            None => Err("missing or malformed Authorization header".to_string()),
        };

        match verified {
            Ok(claims) => {
                req.extensions_mut().insert(claims);
                let fut = self.service.call(req);
                Box::pin(async move { fut.await.map(ServiceResponse::map_into_left_body) })
            }
            Err(reason) => {
                tracing::warn!(path = req.path(), "Rejected request: {}", reason);
                let response = ApiError::Unauthorized.error_response();
                Box::pin(async move { Ok(req.into_response(response).map_into_right_body()) })
            }
        }
    }
}

/// Claims of the caller, available on routes wrapped by [`JwtAuth`].
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub Claims);

impl AuthenticatedUser {
    pub fn user_id(&self) -> &str {
        &self.0.user_id
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<Claims>()
                .cloned()
                .map(AuthenticatedUser)
                .ok_or(ApiError::Unauthorized),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test, web, App, HttpResponse};

    async fn whoami(user: AuthenticatedUser) -> HttpResponse {
        HttpResponse::Ok().body(user.user_id().to_string())
    }

    fn tokens() -> TokenService {
        TokenService::new("middleware-secret", 3600)
    }

    #[actix_web::test]
    async fn test_valid_token_reaches_handler_with_claims() {
        let app = test::init_service(
            App::new().service(
                web::resource("/me")
                    .wrap(JwtAuth::new(tokens()))
                    .route(web::get().to(whoami)),
            ),
        )
        .await;

        let token = tokens().issue("user-42").unwrap();
        let req = test::TestRequest::get()
            .uri("/me")
            .insert_header((AUTHORIZATION, format!("Bearer {}", token)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(test::read_body(resp).await, "user-42");
    }

    #[actix_web::test]
    async fn test_rejections_are_401() {
        let app = test::init_service(
            App::new().service(
                web::resource("/me")
                    .wrap(JwtAuth::new(tokens()))
                    .route(web::get().to(whoami)),
            ),
        )
        .await;

        let foreign = TokenService::new("other-secret", 3600).issue("user-42").unwrap();
        let headers = [
            None,
            Some("Bearer".to_string()),
            Some("Bearer ".to_string()),
            Some("Basic dXNlcjpwYXNz".to_string()),
            Some("Bearer not.a.jwt".to_string()),
            Some(format!("Bearer {}", foreign)),
        ];

        for header in headers {
            let mut req = test::TestRequest::get().uri("/me");
            if let Some(value) = &header {
                req = req.insert_header((AUTHORIZATION, value.as_str()));
            }
            let resp = test::call_service(&app, req.to_request()).await;
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "header {:?}", header);
        }
    }

    #[actix_web::test]
    async fn test_extractor_without_middleware_is_unauthorized() {
        let app = test::init_service(App::new().route("/me", web::get().to(whoami))).await;
        let resp = test::call_service(&app, test::TestRequest::get().uri("/me").to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
