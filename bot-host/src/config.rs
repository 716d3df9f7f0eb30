use anyhow::{Context, Result};
use common_auth::{TokenValidationConfig, DEFAULT_SECTION};
use std::env;
use std::net::{IpAddr, SocketAddr};

#[derive(Debug, Clone)]
pub struct HostConfig {
    pub host: String,
    pub port: u16,
    /// JSON settings document holding the token validation section.
    pub settings_path: Option<String>,
    pub auth_section: String,
    /// Lets requests without an Authorization header through. Development only.
    pub allow_anonymous: bool,
    pub dev_public_key_pem: Option<String>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3978,
            settings_path: None,
            auth_section: DEFAULT_SECTION.to_string(),
            allow_anonymous: false,
            dev_public_key_pem: None,
        }
    }
}

impl HostConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let host = lookup("HOST").unwrap_or(defaults.host);
        let port = match lookup("PORT") {
            Some(value) => value
                .trim()
                .parse::<u16>()
                .with_context(|| format!("PORT must be a valid port number, got '{value}'"))?,
            None => defaults.port,
        };
        let settings_path = lookup("BOT_SETTINGS_PATH").and_then(|value| normalize_optional(&value));
        let auth_section = lookup("BOT_AUTH_SECTION")
            .and_then(|value| normalize_optional(&value))
            .unwrap_or(defaults.auth_section);
        let allow_anonymous = lookup("BOT_ALLOW_ANONYMOUS")
            .map(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        let dev_public_key_pem =
            lookup("BOT_DEV_PUBLIC_KEY_PEM").and_then(|value| normalize_optional(&value));

        Ok(Self {
            host,
            port,
            settings_path,
            auth_section,
            allow_anonymous,
            dev_public_key_pem,
        })
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .host
            .parse()
            .with_context(|| format!("HOST must be an IP address, got '{}'", self.host))?;
        Ok(SocketAddr::from((ip, self.port)))
    }

    /// Token validation settings from the settings file when one is configured,
    /// otherwise from `TOKEN_VALIDATION_*` variables.
    pub fn load_token_validation(&self) -> Result<TokenValidationConfig> {
        match &self.settings_path {
            Some(path) => TokenValidationConfig::from_settings_file(path, &self.auth_section)
                .with_context(|| format!("Failed to load token validation settings from {path}")),
            None => Ok(TokenValidationConfig::from_env()),
        }
    }
}

fn normalize_optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_when_unset() {
        let config = HostConfig::from_lookup(|_| None).expect("config");
        assert_eq!(config.port, 3978);
        assert_eq!(config.auth_section, "TokenValidation");
        assert!(!config.allow_anonymous);
        assert_eq!(config.socket_addr().expect("addr").to_string(), "0.0.0.0:3978");
    }

    #[test]
    fn overrides_from_lookup() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("HOST", "127.0.0.1"),
            ("PORT", "8080"),
            ("BOT_AUTH_SECTION", "BotAuth"),
            ("BOT_ALLOW_ANONYMOUS", "true"),
            ("BOT_SETTINGS_PATH", " "),
        ]);
        let config =
            HostConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string())).expect("config");
        assert_eq!(config.socket_addr().expect("addr").to_string(), "127.0.0.1:8080");
        assert_eq!(config.auth_section, "BotAuth");
        assert!(config.allow_anonymous);
        assert!(config.settings_path.is_none());
    }

    #[test]
    fn invalid_port_is_an_error() {
        let err = HostConfig::from_lookup(|key| (key == "PORT").then(|| "http".to_string()))
            .expect_err("should fail");
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn settings_file_is_read_from_section() {
        let path = env::temp_dir().join(format!("bot-host-settings-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{ "BotAuth": { "Audience": ["abc123"], "TenantId": "t1" } }"#,
        )
        .expect("write settings");

        let config = HostConfig {
            settings_path: Some(path.to_string_lossy().into_owned()),
            auth_section: "BotAuth".to_string(),
            ..HostConfig::default()
        };
        let token_config = config.load_token_validation().expect("settings load");
        assert_eq!(token_config.audience, vec!["abc123"]);
        assert_eq!(token_config.tenant_id.as_deref(), Some("t1"));

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn missing_settings_file_is_an_error() {
        let config = HostConfig {
            settings_path: Some("/nonexistent/bot-settings.json".to_string()),
            ..HostConfig::default()
        };
        assert!(config.load_token_validation().is_err());
    }
}
