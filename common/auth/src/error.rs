use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

/// Startup-time failures while turning configuration into a validation policy.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{section}:Audience not set")]
    MissingAudience { section: String },
    #[error("failed to read settings file '{path}': {message}")]
    Read { path: String, message: String },
    #[error("failed to parse settings section '{section}': {message}")]
    Parse { section: String, message: String },
}

impl ConfigError {
    /// Configuration key the error refers to, when there is one.
    pub fn key(&self) -> Option<String> {
        match self {
            ConfigError::MissingAudience { section } => Some(format!("{section}:Audience")),
            ConfigError::Read { .. } => None,
            ConfigError::Parse { section, .. } => Some(section.clone()),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("token missing kid header")]
    MissingKeyId,
    #[error("no signing key found for kid '{0}'")]
    UnknownKeyId(String),
    #[error("failed to decode token header: {0}")]
    InvalidHeader(String),
    #[error("token verification failed: {0}")]
    Verification(String),
    #[error("invalid claim '{0}' with value '{1}'")]
    InvalidClaim(&'static str, String),
    #[error("token missing '{0}' claim")]
    MissingClaim(&'static str),
    #[error("malformed claim payload: {0}")]
    InvalidJson(String),
    #[error("token issuer '{issuer}' does not match signing key issuer '{expected}'")]
    SigningKeyIssuerMismatch { issuer: String, expected: String },
    #[error("failed to parse decoding key for kid '{0}': {1}")]
    KeyParse(String, String),
    #[error("authorization header missing")]
    MissingAuthorization,
    #[error("authorization header malformed")]
    InvalidAuthorization,
    #[error("failed to fetch OpenID metadata: {0}")]
    MetadataFetch(String),
    #[error("failed to parse OpenID metadata: {0}")]
    MetadataDecode(String),
    #[error("failed to fetch JWKS: {0}")]
    JwksFetch(String),
    #[error("failed to parse JWKS response: {0}")]
    JwksDecode(String),
    #[error("JWKS entry missing key id (kid)")]
    JwksMissingKid,
    #[error("JWKS key '{0}' missing required RSA components")]
    JwksMissingComponents(String),
    #[error("JWKS key '{kid}' uses unsupported alg '{alg}'")]
    JwksUnsupportedAlg { kid: String, alg: String },
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(value: jsonwebtoken::errors::Error) -> Self {
        Self::Verification(value.to_string())
    }
}

impl AuthError {
    /// Stable label used in error bodies and metrics.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MissingAuthorization | AuthError::InvalidAuthorization => "AUTH_HEADER",
            AuthError::MissingKeyId | AuthError::UnknownKeyId(_) => "AUTH_KEY",
            AuthError::InvalidHeader(_)
            | AuthError::Verification(_)
            | AuthError::SigningKeyIssuerMismatch { .. } => "AUTH_TOKEN",
            AuthError::InvalidClaim(_, _)
            | AuthError::MissingClaim(_)
            | AuthError::InvalidJson(_) => "AUTH_CLAIMS",
            AuthError::KeyParse(_, _)
            | AuthError::MetadataFetch(_)
            | AuthError::MetadataDecode(_)
            | AuthError::JwksFetch(_)
            | AuthError::JwksDecode(_)
            | AuthError::JwksMissingKid
            | AuthError::JwksMissingComponents(_)
            | AuthError::JwksUnsupportedAlg { .. } => "AUTH_METADATA",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.code() {
            "AUTH_METADATA" => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            code: self.code(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
