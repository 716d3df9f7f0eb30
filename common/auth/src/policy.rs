use std::time::Duration;

use tracing::{debug, info};

use crate::config::{TokenValidationConfig, DEFAULT_SECTION};
use crate::error::ConfigError;
use crate::issuers::{
    tenant_issuer_v1, tenant_issuer_v2, DEFAULT_ISSUERS, GOV_BOT_SERVICE_METADATA_URL,
    GOV_ENTRA_METADATA_URL, PUBLIC_BOT_SERVICE_METADATA_URL, PUBLIC_ENTRA_METADATA_URL,
};

/// Tolerance applied to `exp` and `nbf` checks.
pub const CLOCK_SKEW: Duration = Duration::from_secs(5 * 60);

/// Extra check run against the key that signed a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningKeyIssuerValidation {
    /// A key published with an `issuer` may only sign tokens from that issuer,
    /// where `{tenantid}` in the key issuer is replaced by the token's `tid`.
    Aad,
}

/// Validation policy shared by every request for the life of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPolicy {
    pub audience: String,
    pub valid_issuers: Vec<String>,
    pub clock_skew: Duration,
    pub validate_issuer: bool,
    pub validate_audience: bool,
    pub validate_lifetime: bool,
    pub validate_signing_key: bool,
    pub require_signed_tokens: bool,
    pub signing_key_validation: SigningKeyIssuerValidation,
    pub is_gov: bool,
    pub azure_bot_service_token_handling: bool,
    /// OpenID metadata for tokens issued by the bot channel service.
    pub bot_service_metadata_url: String,
    /// OpenID metadata for Entra ID issued tokens.
    pub entra_metadata_url: String,
}

impl ResolvedPolicy {
    /// Builds the policy, reporting a missing audience against [`DEFAULT_SECTION`].
    pub fn build(config: &TokenValidationConfig) -> Result<Self, ConfigError> {
        Self::build_for_section(config, DEFAULT_SECTION)
    }

    /// Builds the policy; `section` only affects the error message.
    pub fn build_for_section(
        config: &TokenValidationConfig,
        section: &str,
    ) -> Result<Self, ConfigError> {
        let audience = config
            .audience
            .first()
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ConfigError::MissingAudience {
                section: section.to_string(),
            })?
            .to_string();

        let valid_issuers = resolve_issuers(config);

        let (default_abs, default_entra) = if config.is_gov {
            (GOV_BOT_SERVICE_METADATA_URL, GOV_ENTRA_METADATA_URL)
        } else {
            (PUBLIC_BOT_SERVICE_METADATA_URL, PUBLIC_ENTRA_METADATA_URL)
        };
        let bot_service_metadata_url = config
            .azure_bot_service_open_id_metadata_url
            .clone()
            .unwrap_or_else(|| default_abs.to_string());
        let entra_metadata_url = config
            .open_id_metadata_url
            .clone()
            .unwrap_or_else(|| default_entra.to_string());

        info!(
            audience = %audience,
            issuers = valid_issuers.len(),
            is_gov = config.is_gov,
            bot_service_token_handling = config.azure_bot_service_token_handling,
            "Resolved token validation policy"
        );

        Ok(Self {
            audience,
            valid_issuers,
            clock_skew: CLOCK_SKEW,
            validate_issuer: true,
            validate_audience: true,
            validate_lifetime: true,
            validate_signing_key: true,
            require_signed_tokens: true,
            signing_key_validation: SigningKeyIssuerValidation::Aad,
            is_gov: config.is_gov,
            azure_bot_service_token_handling: config.azure_bot_service_token_handling,
            bot_service_metadata_url,
            entra_metadata_url,
        })
    }

    /// Skew in whole seconds, as consumed by `jsonwebtoken::Validation::leeway`.
    pub fn leeway_seconds(&self) -> u64 {
        self.clock_skew.as_secs()
    }
}

fn resolve_issuers(config: &TokenValidationConfig) -> Vec<String> {
    if let Some(explicit) = config.valid_issuers.as_ref().filter(|list| !list.is_empty()) {
        debug!(count = explicit.len(), "Using configured valid issuers");
        return explicit.clone();
    }

    let mut issuers: Vec<String> = DEFAULT_ISSUERS.iter().map(|s| s.to_string()).collect();
    if let Some(tenant) = config
        .tenant_id
        .as_deref()
        .map(str::trim)
        .filter(|tenant| !tenant.is_empty())
    {
        issuers.push(tenant_issuer_v1(tenant));
        issuers.push(tenant_issuer_v2(tenant));
    }
    issuers
}
