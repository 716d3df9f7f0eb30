use std::env;

use serde::Deserialize;

use crate::error::ConfigError;

/// Name of the settings section read when the caller does not supply one.
pub const DEFAULT_SECTION: &str = "TokenValidation";

/// Token validation settings as supplied by the operator.
///
/// Every field except `audience` has a default, so a partially filled section
/// still deserializes. Resolving it into a [`crate::ResolvedPolicy`] is where
/// a missing audience is reported.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TokenValidationConfig {
    /// Accepted audiences. Only the first entry is used.
    #[serde(default, deserialize_with = "audience_list")]
    pub audience: Vec<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// Explicit issuers. When non-empty they replace the built-in defaults.
    #[serde(default)]
    pub valid_issuers: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_gov: bool,
    #[serde(default = "default_true", deserialize_with = "lenient_bool")]
    pub azure_bot_service_token_handling: bool,
    #[serde(default, rename = "AzureBotServiceOpenIdMetadataUrl")]
    pub azure_bot_service_open_id_metadata_url: Option<String>,
    #[serde(default, rename = "OpenIdMetadataUrl")]
    pub open_id_metadata_url: Option<String>,
}

impl Default for TokenValidationConfig {
    fn default() -> Self {
        Self {
            audience: Vec::new(),
            tenant_id: None,
            valid_issuers: None,
            is_gov: false,
            azure_bot_service_token_handling: true,
            azure_bot_service_open_id_metadata_url: None,
            open_id_metadata_url: None,
        }
    }
}

impl TokenValidationConfig {
    /// Config with a single audience and every other field defaulted.
    pub fn new(audience: impl Into<String>) -> Self {
        Self {
            audience: vec![audience.into()],
            ..Self::default()
        }
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_valid_issuers<I, S>(mut self, issuers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.valid_issuers = Some(issuers.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_gov(mut self, is_gov: bool) -> Self {
        self.is_gov = is_gov;
        self
    }

    pub fn with_bot_service_token_handling(mut self, enabled: bool) -> Self {
        self.azure_bot_service_token_handling = enabled;
        self
    }

    pub fn with_metadata_urls(
        mut self,
        bot_service: impl Into<String>,
        entra: impl Into<String>,
    ) -> Self {
        self.azure_bot_service_open_id_metadata_url = Some(bot_service.into());
        self.open_id_metadata_url = Some(entra.into());
        self
    }

    /// Reads `settings[section]`. An absent section yields the defaults.
    pub fn from_settings(
        settings: &serde_json::Value,
        section: &str,
    ) -> Result<Self, ConfigError> {
        match settings.get(section) {
            Some(value) => serde_json::from_value(value.clone()).map_err(|err| {
                ConfigError::Parse {
                    section: section.to_string(),
                    message: err.to_string(),
                }
            }),
            None => Ok(Self::default()),
        }
    }

    /// Parses a JSON settings document and reads `section` from it.
    pub fn from_settings_str(raw: &str, section: &str) -> Result<Self, ConfigError> {
        let settings: serde_json::Value =
            serde_json::from_str(raw).map_err(|err| ConfigError::Parse {
                section: section.to_string(),
                message: err.to_string(),
            })?;
        Self::from_settings(&settings, section)
    }

    /// Loads a JSON settings file from disk.
    pub fn from_settings_file(path: &str, section: &str) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|err| ConfigError::Read {
            path: path.to_string(),
            message: err.to_string(),
        })?;
        Self::from_settings_str(&raw, section)
    }

    /// Reads `TOKEN_VALIDATION_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let audience = lookup("TOKEN_VALIDATION_AUDIENCE")
            .map(|value| split_list(&value))
            .unwrap_or_default();
        let tenant_id = lookup("TOKEN_VALIDATION_TENANT_ID").and_then(|v| normalize_optional(&v));
        let valid_issuers = lookup("TOKEN_VALIDATION_VALID_ISSUERS").map(|value| split_list(&value));
        let is_gov = lookup("TOKEN_VALIDATION_IS_GOV")
            .and_then(|value| parse_bool(&value))
            .unwrap_or(false);
        let azure_bot_service_token_handling = lookup("TOKEN_VALIDATION_ABS_TOKEN_HANDLING")
            .and_then(|value| parse_bool(&value))
            .unwrap_or(true);
        let azure_bot_service_open_id_metadata_url =
            lookup("TOKEN_VALIDATION_ABS_METADATA_URL").and_then(|v| normalize_optional(&v));
        let open_id_metadata_url =
            lookup("TOKEN_VALIDATION_METADATA_URL").and_then(|v| normalize_optional(&v));

        Self {
            audience,
            tenant_id,
            valid_issuers,
            is_gov,
            azure_bot_service_token_handling,
            azure_bot_service_open_id_metadata_url,
            open_id_metadata_url,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AudienceRepr {
    Single(String),
    Many(Vec<String>),
}

fn audience_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let repr = Option::<AudienceRepr>::deserialize(deserializer)?;
    Ok(match repr {
        Some(AudienceRepr::Single(item)) => vec![item],
        Some(AudienceRepr::Many(items)) => items,
        None => Vec::new(),
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BoolRepr {
    Bool(bool),
    Text(String),
}

/// Accepts JSON booleans and the string forms understood by [`parse_bool`].
fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match BoolRepr::deserialize(deserializer)? {
        BoolRepr::Bool(value) => Ok(value),
        BoolRepr::Text(text) => parse_bool(&text).ok_or_else(|| {
            serde::de::Error::custom(format!("expected a boolean, found '{text}'"))
        }),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn normalize_optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
