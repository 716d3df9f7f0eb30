use jsonwebtoken::DecodingKey;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::{AuthError, AuthResult};

/// Decoding key plus the issuer it is restricted to, when the JWKS publishes one.
#[derive(Clone)]
pub struct SigningKey {
    pub key: DecodingKey,
    pub issuer: Option<String>,
}

impl SigningKey {
    pub fn new(key: DecodingKey) -> Self {
        Self { key, issuer: None }
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }
}

#[derive(Clone)]
pub struct JwksFetcher {
    client: Client,
    url: String,
}

impl JwksFetcher {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }

    pub fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub async fn fetch(&self) -> AuthResult<Vec<(String, SigningKey)>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|err| AuthError::JwksFetch(err.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::JwksFetch(format!(
                "HTTP {} from {}",
                response.status(),
                self.url
            )));
        }

        let body: JwksResponse = response
            .json()
            .await
            .map_err(|err| AuthError::JwksDecode(err.to_string()))?;

        parse_keys(body)
    }
}

/// Converts every usable RSA entry. Unusable entries are skipped so a key set
/// in mid-rotation still serves its valid keys; the error of the last rejected
/// entry is returned only when nothing usable remains.
fn parse_keys(body: JwksResponse) -> AuthResult<Vec<(String, SigningKey)>> {
    let mut keys = Vec::new();
    let mut rejected = None;
    for entry in body.keys.into_iter() {
        match parse_entry(entry) {
            Ok(Some(key)) => keys.push(key),
            Ok(None) => {}
            Err(err) => {
                debug!(error = %err, "Skipping unusable JWKS entry");
                rejected = Some(err);
            }
        }
    }

    match rejected {
        Some(err) if keys.is_empty() => Err(err),
        _ => Ok(keys),
    }
}

fn parse_entry(entry: JwkEntry) -> AuthResult<Option<(String, SigningKey)>> {
    let kid = entry.kid.ok_or(AuthError::JwksMissingKid)?;
    let kty = entry.kty.unwrap_or_else(|| "RSA".to_string());
    if kty != "RSA" {
        debug!(kid, kty, "Skipping non-RSA JWKS entry");
        return Ok(None);
    }

    if let Some(alg) = entry.alg {
        if alg != "RS256" {
            return Err(AuthError::JwksUnsupportedAlg { kid, alg });
        }
    }

    let modulus = entry
        .n
        .ok_or_else(|| AuthError::JwksMissingComponents(kid.clone()))?;
    let exponent = entry
        .e
        .ok_or_else(|| AuthError::JwksMissingComponents(kid.clone()))?;

    let decoding_key = DecodingKey::from_rsa_components(&modulus, &exponent)
        .map_err(|err| AuthError::KeyParse(kid.clone(), err.to_string()))?;
    let signing_key = SigningKey {
        key: decoding_key,
        issuer: entry.issuer,
    };
    Ok(Some((kid, signing_key)))
}

#[derive(Debug, Deserialize)]
struct JwksResponse {
    keys: Vec<JwkEntry>,
}

#[derive(Debug, Deserialize)]
struct JwkEntry {
    kid: Option<String>,
    kty: Option<String>,
    alg: Option<String>,
    n: Option<String>,
    e: Option<String>,
    issuer: Option<String>,
}
