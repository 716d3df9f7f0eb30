//! Well-known issuers and OpenID metadata endpoints for bot channel and Entra ID tokens.

/// Issuer used by the bot channel service when it calls the bot.
pub const BOT_SERVICE_ISSUER: &str = "https://api.botframework.com";

/// Issuers accepted when no explicit list is configured (public cloud).
pub const DEFAULT_ISSUERS: [&str; 5] = [
    BOT_SERVICE_ISSUER,
    "https://sts.windows.net/d6d49420-f39b-4df7-a1dc-d59a935871db/",
    "https://login.microsoftonline.com/d6d49420-f39b-4df7-a1dc-d59a935871db/v2.0",
    "https://sts.windows.net/f8cdef31-a31e-4b4a-93e4-5f571e91255a/",
    "https://login.microsoftonline.com/f8cdef31-a31e-4b4a-93e4-5f571e91255a/v2.0",
];

pub const PUBLIC_BOT_SERVICE_METADATA_URL: &str =
    "https://login.botframework.com/v1/.well-known/openidconfiguration";
pub const PUBLIC_ENTRA_METADATA_URL: &str =
    "https://login.microsoftonline.com/common/v2.0/.well-known/openid-configuration";
pub const GOV_BOT_SERVICE_METADATA_URL: &str =
    "https://login.botframework.azure.us/v1/.well-known/openidconfiguration";
pub const GOV_ENTRA_METADATA_URL: &str =
    "https://login.microsoftonline.us/cab8a31a-1906-4287-a0d8-4eef66b95f6e/v2.0/.well-known/openid-configuration";

/// Placeholder substituted with the token's `tid` claim when a signing key is tenant scoped.
pub const TENANT_PLACEHOLDER: &str = "{tenantid}";

/// Issuer of v1 access tokens for a tenant.
pub fn tenant_issuer_v1(tenant_id: &str) -> String {
    format!("https://sts.windows.net/{tenant_id}/")
}

/// Issuer of v2 access tokens for a tenant.
pub fn tenant_issuer_v2(tenant_id: &str) -> String {
    format!("https://login.microsoftonline.com/{tenant_id}/v2.0")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_templates_embed_tenant() {
        assert_eq!(
            tenant_issuer_v1("contoso"),
            "https://sts.windows.net/contoso/"
        );
        assert_eq!(
            tenant_issuer_v2("contoso"),
            "https://login.microsoftonline.com/contoso/v2.0"
        );
    }
}
