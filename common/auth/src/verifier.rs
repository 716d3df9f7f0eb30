use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde_json::Value;
use tracing::debug;

use crate::claims::Claims;
use crate::error::{AuthError, AuthResult};
use crate::issuers::{BOT_SERVICE_ISSUER, TENANT_PLACEHOLDER};
use crate::jwks::SigningKey;
use crate::metadata::MetadataCache;
use crate::policy::{ResolvedPolicy, SigningKeyIssuerValidation};

/// Thread-safe store for signing keys loaded from JWKS/PEM sources.
#[derive(Clone, Default)]
pub struct InMemoryKeyStore {
    inner: Arc<RwLock<HashMap<String, SigningKey>>>,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_key(&self, kid: impl Into<String>, key: SigningKey) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.insert(kid.into(), key);
    }

    pub fn insert_rsa_pem(&self, kid: impl Into<String>, pem: &[u8]) -> AuthResult<()> {
        let kid = kid.into();
        let key = DecodingKey::from_rsa_pem(pem)
            .map_err(|err| AuthError::KeyParse(kid.clone(), err.to_string()))?;
        self.insert_key(kid, SigningKey::new(key));
        Ok(())
    }

    pub fn get(&self, kid: &str) -> Option<SigningKey> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard.get(kid).cloned()
    }

    pub fn contains(&self, kid: &str) -> bool {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard.contains_key(kid)
    }

    pub fn is_empty(&self) -> bool {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard.is_empty()
    }

    pub fn replace_all<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (String, SigningKey)>,
    {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.clear();
        for (kid, key) in entries.into_iter() {
            guard.insert(kid, key);
        }
    }
}

/// Verifies bearer tokens against a [`ResolvedPolicy`].
///
/// Keys registered up front (PEM or raw) are consulted first; anything else is
/// looked up through the metadata source matching the token's issuer family.
#[derive(Clone)]
pub struct JwtVerifier {
    policy: Arc<ResolvedPolicy>,
    store: InMemoryKeyStore,
    metadata: Option<MetadataCache>,
}

impl JwtVerifier {
    pub fn builder(policy: ResolvedPolicy) -> JwtVerifierBuilder {
        JwtVerifierBuilder::new(policy)
    }

    /// Metadata URL used for keys of tokens from `issuer`.
    pub fn metadata_url_for(&self, issuer: &str) -> &str {
        if self.policy.azure_bot_service_token_handling && issuer == BOT_SERVICE_ISSUER {
            &self.policy.bot_service_metadata_url
        } else {
            &self.policy.entra_metadata_url
        }
    }

    pub async fn verify(&self, token: &str) -> AuthResult<Claims> {
        let header =
            decode_header(token).map_err(|err| AuthError::InvalidHeader(err.to_string()))?;
        let kid = header.kid.ok_or(AuthError::MissingKeyId)?;
        let issuer = unverified_issuer(token)?;
        let signing_key = self.resolve_key(&kid, &issuer).await?;

        let token_data = decode::<Value>(token, &signing_key.key, &self.validation())?;
        let claims = Claims::try_from(token_data.claims)?;
        self.check_signing_key_issuer(&signing_key, &claims)?;

        debug!(kid, issuer = %claims.issuer, "verified JWT successfully");
        Ok(claims)
    }

    fn validation(&self) -> Validation {
        let policy = &self.policy;
        let mut validation = Validation::new(Algorithm::RS256);
        if policy.validate_issuer {
            validation.set_issuer(&policy.valid_issuers[..]);
        }
        if policy.validate_audience {
            validation.set_audience(&[policy.audience.as_str()]);
        } else {
            validation.validate_aud = false;
        }
        validation.validate_exp = policy.validate_lifetime;
        validation.validate_nbf = policy.validate_lifetime;
        validation.leeway = policy.leeway_seconds();
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);
        validation
    }

    async fn resolve_key(&self, kid: &str, issuer: &str) -> AuthResult<SigningKey> {
        if let Some(key) = self.store.get(kid) {
            return Ok(key);
        }

        match &self.metadata {
            Some(cache) => {
                let source = cache.source(self.metadata_url_for(issuer));
                source.signing_key(kid).await
            }
            None => Err(AuthError::UnknownKeyId(kid.to_string())),
        }
    }

    fn check_signing_key_issuer(&self, key: &SigningKey, claims: &Claims) -> AuthResult<()> {
        if !self.policy.validate_signing_key {
            return Ok(());
        }

        match self.policy.signing_key_validation {
            SigningKeyIssuerValidation::Aad => {
                let Some(template) = key.issuer.as_deref() else {
                    return Ok(());
                };
                let expected = match claims.tenant_id.as_deref() {
                    Some(tenant) => template.replace(TENANT_PLACEHOLDER, tenant),
                    None => template.to_string(),
                };
                if expected.trim_end_matches('/') == claims.issuer.trim_end_matches('/') {
                    Ok(())
                } else {
                    Err(AuthError::SigningKeyIssuerMismatch {
                        issuer: claims.issuer.clone(),
                        expected,
                    })
                }
            }
        }
    }
}

/// Reads `iss` without checking the signature; only used to pick a key source.
fn unverified_issuer(token: &str) -> AuthResult<String> {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<Value>(token, &DecodingKey::from_secret(&[]), &validation)
        .map_err(|err| AuthError::InvalidHeader(err.to_string()))?;
    data.claims
        .get("iss")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(AuthError::MissingClaim("iss"))
}

pub struct JwtVerifierBuilder {
    policy: ResolvedPolicy,
    store: InMemoryKeyStore,
    metadata: Option<MetadataCache>,
}

impl JwtVerifierBuilder {
    fn new(policy: ResolvedPolicy) -> Self {
        Self {
            policy,
            store: InMemoryKeyStore::new(),
            metadata: None,
        }
    }

    pub fn with_decoding_key(self, kid: impl Into<String>, key: DecodingKey) -> Self {
        self.store.insert_key(kid, SigningKey::new(key));
        self
    }

    pub fn with_signing_key(self, kid: impl Into<String>, key: SigningKey) -> Self {
        self.store.insert_key(kid, key);
        self
    }

    pub fn with_rsa_pem(self, kid: impl Into<String>, pem: &[u8]) -> AuthResult<Self> {
        self.store.insert_rsa_pem(kid, pem)?;
        Ok(self)
    }

    pub fn with_metadata_cache(mut self, cache: MetadataCache) -> Self {
        self.metadata = Some(cache);
        self
    }

    pub fn build(self) -> JwtVerifier {
        JwtVerifier {
            policy: Arc::new(self.policy),
            store: self.store,
            metadata: self.metadata,
        }
    }
}
