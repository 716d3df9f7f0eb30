use axum::{
    body::Body,
    http::{header, Request},
    middleware::Next,
    response::Response,
};
use common_auth::extractors::parse_bearer;
use common_auth::AuthError;
use tracing::{debug, warn};

use crate::app_state::AppState;

/// Requires a valid bearer token and stores the verified claims in request extensions.
pub async fn auth_middleware(
    state: AppState,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let Some(value) = request.headers().get(header::AUTHORIZATION) else {
        if state.config.allow_anonymous {
            state.metrics.record_validation("anonymous");
            debug!("No Authorization header; anonymous access enabled");
            return Ok(next.run(request).await);
        }
        state.metrics.record_validation(AuthError::MissingAuthorization.code());
        return Err(AuthError::MissingAuthorization);
    };

    let token = parse_bearer(value).inspect_err(|err| {
        state.metrics.record_validation(err.code());
    })?;

    match state.jwt_verifier.verify(&token).await {
        Ok(claims) => {
            state.metrics.record_validation("accepted");
            debug!(
                issuer = %claims.issuer,
                app_id = claims.app_id.as_deref().unwrap_or("-"),
                "Bearer token accepted"
            );
            request.extensions_mut().insert(claims);
            Ok(next.run(request).await)
        }
        Err(err) => {
            state.metrics.record_validation(err.code());
            warn!(error = %err, code = err.code(), "JWT verification failed");
            Err(err)
        }
    }
}
