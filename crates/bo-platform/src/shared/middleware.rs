//! API Middleware
//!
//! Bearer-token authentication for Axum. The layer validates the token,
//! rejects blacklisted ones, and runs the rest of the request inside an
//! [`IdentityContext`] scope. Anonymous requests pass through with no
//! identity; handlers that need one use the [`Authenticated`] extractor.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, Request},
    response::{IntoResponse, Response},
};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::{debug, warn};

use crate::auth::auth_service::{extract_bearer_token, AccessTokenClaims, AuthService};
use crate::auth::blacklist::TokenBlacklist;
use crate::identity::IdentityContext;
use crate::shared::error::PlatformError;

/// Services the authentication layer needs
#[derive(Clone)]
pub struct AppState {
    pub auth_service: Arc<AuthService>,
    pub blacklist: Arc<TokenBlacklist>,
}

/// Authenticated caller; rejects with 401 when the request is anonymous
pub struct Authenticated(pub Arc<IdentityContext>);

impl std::ops::Deref for Authenticated {
    type Target = IdentityContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = PlatformError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Arc<IdentityContext>>()
            .cloned()
            .map(Authenticated)
            .ok_or_else(|| PlatformError::unauthorized("Authentication required"))
    }
}

/// Validated claims of the presented access token
pub struct BearerClaims(pub Arc<AccessTokenClaims>);

#[async_trait]
impl<S> FromRequestParts<S> for BearerClaims
where
    S: Send + Sync,
{
    type Rejection = PlatformError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Arc<AccessTokenClaims>>()
            .cloned()
            .map(BearerClaims)
            .ok_or_else(|| PlatformError::unauthorized("Authentication required"))
    }
}

#[derive(Clone)]
pub struct AuthLayer {
    state: AppState,
}

impl AuthLayer {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthMiddleware {
            inner,
            state: self.state.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AuthMiddleware<S> {
    inner: S,
    state: AppState,
}

impl<S, B> Service<Request<B>> for AuthMiddleware<S>
where
    S: Service<Request<B>, Response = Response> + Send + Clone + 'static,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        // the polled-ready service handles this request
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let state = self.state.clone();

        Box::pin(async move {
            let token = req
                .headers()
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(extract_bearer_token)
                .map(String::from);

            let Some(token) = token else {
                return IdentityContext::scope(None, inner.call(req)).await;
            };

            let claims = match state.auth_service.validate_token(&token) {
                Ok(claims) => claims,
                Err(e) => {
                    debug!(error = %e, "Bearer token rejected");
                    return Ok(e.into_response());
                }
            };

            if state.blacklist.is_revoked(&claims.jti) {
                warn!(jti = %claims.jti, user_id = %claims.sub, "Blacklisted access token presented");
                return Ok(PlatformError::TokenRevoked.into_response());
            }

            let identity = Arc::new(IdentityContext::from_claims(&claims));
            req.extensions_mut().insert(Arc::clone(&identity));
            req.extensions_mut().insert(Arc::new(claims));

            IdentityContext::scope(Some(identity), inner.call(req)).await
        })
    }
}
