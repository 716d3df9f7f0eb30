use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::{header::AUTHORIZATION, request::Parts, HeaderValue};

use crate::claims::Claims;
use crate::error::{AuthError, AuthResult};
use crate::verifier::JwtVerifier;

/// Caller identity for a bot endpoint.
///
/// Claims already verified by an upstream middleware are reused from the
/// request extensions. Otherwise the bearer token is verified with the
/// state's [`JwtVerifier`] and the claims are stored for later extractors.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub claims: Claims,
}

impl AuthContext {
    /// Application that called the bot (`appid` or `azp`).
    pub fn app_id(&self) -> Option<&str> {
        self.claims.app_id.as_deref()
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.claims.tenant_id.as_deref()
    }

    /// Channel endpoint replies go to; only bot service tokens carry it.
    pub fn service_url(&self) -> Option<&str> {
        self.claims.service_url.as_deref()
    }

    pub fn into_claims(self) -> Claims {
        self.claims
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    Arc<JwtVerifier>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(claims) = parts.extensions.get::<Claims>() {
            return Ok(Self {
                claims: claims.clone(),
            });
        }

        let header_value = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingAuthorization)?;
        let token = parse_bearer(header_value)?;

        let verifier = Arc::<JwtVerifier>::from_ref(state);
        let claims = verifier.verify(&token).await?;
        parts.extensions.insert(claims.clone());

        Ok(Self { claims })
    }
}

/// Token from an `Authorization: Bearer <token>` header value.
pub fn parse_bearer(value: &HeaderValue) -> AuthResult<String> {
    let token = value
        .to_str()
        .map_err(|_| AuthError::InvalidAuthorization)?
        .trim()
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidAuthorization)?
        .trim();

    if token.is_empty() {
        return Err(AuthError::InvalidAuthorization);
    }
    Ok(token.to_owned())
}
