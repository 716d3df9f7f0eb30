use std::sync::Arc;

use axum::extract::FromRef;
use common_auth::JwtVerifier;

use crate::config::HostConfig;
use crate::metrics::HostMetrics;

#[derive(Clone)]
pub struct AppState {
    pub jwt_verifier: Arc<JwtVerifier>,
    pub metrics: Arc<HostMetrics>,
    pub config: Arc<HostConfig>,
}

impl FromRef<AppState> for Arc<JwtVerifier> {
    fn from_ref(state: &AppState) -> Self {
        state.jwt_verifier.clone()
    }
}
