pub mod claims;
pub mod config;
pub mod error;
pub mod extractors;
pub mod issuers;
pub mod jwks;
pub mod metadata;
pub mod policy;
pub mod verifier;

pub use claims::Claims;
pub use config::{TokenValidationConfig, DEFAULT_SECTION};
pub use error::{AuthError, AuthResult, ConfigError};
pub use extractors::AuthContext;
pub use jwks::{JwksFetcher, SigningKey};
pub use metadata::{MetadataCache, OpenIdMetadataSource};
pub use policy::{ResolvedPolicy, SigningKeyIssuerValidation, CLOCK_SKEW};
pub use verifier::{InMemoryKeyStore, JwtVerifier, JwtVerifierBuilder};
