use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, AuthResult};

/// Application-focused representation of verified bot token claims.
#[derive(Debug, Clone, Serialize)]
pub struct Claims {
    pub issuer: String,
    pub audience: Vec<String>,
    pub expires_at: DateTime<Utc>,
    pub issued_at: Option<DateTime<Utc>>,
    pub not_before: Option<DateTime<Utc>>,
    /// Calling application: `appid` in v1 tokens, `azp` in v2 tokens.
    pub app_id: Option<String>,
    pub tenant_id: Option<String>,
    pub version: Option<String>,
    /// Channel endpoint the bot should reply to, present on bot service tokens.
    pub service_url: Option<String>,
    pub raw: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ClaimsRepr {
    iss: String,
    #[serde(default)]
    aud: Option<AudienceRepr>,
    exp: i64,
    #[serde(default)]
    iat: Option<i64>,
    #[serde(default)]
    nbf: Option<i64>,
    #[serde(default)]
    appid: Option<String>,
    #[serde(default)]
    azp: Option<String>,
    #[serde(default)]
    tid: Option<String>,
    #[serde(default)]
    ver: Option<String>,
    #[serde(default)]
    serviceurl: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AudienceRepr {
    Single(String),
    Many(Vec<String>),
}

fn timestamp(claim: &'static str, value: i64) -> AuthResult<DateTime<Utc>> {
    Utc.timestamp_opt(value, 0)
        .single()
        .ok_or_else(|| AuthError::InvalidClaim(claim, value.to_string()))
}

impl TryFrom<ClaimsRepr> for Claims {
    type Error = AuthError;

    fn try_from(value: ClaimsRepr) -> AuthResult<Self> {
        let expires_at = timestamp("exp", value.exp)?;
        let issued_at = value.iat.map(|iat| timestamp("iat", iat)).transpose()?;
        let not_before = value.nbf.map(|nbf| timestamp("nbf", nbf)).transpose()?;

        let audience = match value.aud {
            Some(AudienceRepr::Single(item)) => vec![item],
            Some(AudienceRepr::Many(items)) => items,
            None => Vec::new(),
        };

        Ok(Self {
            issuer: value.iss,
            audience,
            expires_at,
            issued_at,
            not_before,
            app_id: value.appid.or(value.azp),
            tenant_id: value.tid,
            version: value.ver,
            service_url: value.serviceurl,
            raw: serde_json::Value::Null,
        })
    }
}

impl TryFrom<serde_json::Value> for Claims {
    type Error = AuthError;

    fn try_from(value: serde_json::Value) -> AuthResult<Self> {
        let repr: ClaimsRepr = serde_json::from_value(value.clone())
            .map_err(|err| AuthError::InvalidJson(err.to_string()))?;
        let mut claims = Claims::try_from(repr)?;
        claims.raw = value;
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn v1_token_uses_appid() {
        let claims = Claims::try_from(json!({
            "iss": "https://api.botframework.com",
            "aud": "bot-app",
            "exp": 1_900_000_000,
            "nbf": 1_800_000_000,
            "appid": "channel-app",
            "serviceurl": "https://smba.trafficmanager.net/teams/"
        }))
        .expect("claims parse");

        assert_eq!(claims.audience, vec!["bot-app".to_string()]);
        assert_eq!(claims.app_id.as_deref(), Some("channel-app"));
        assert_eq!(
            claims.service_url.as_deref(),
            Some("https://smba.trafficmanager.net/teams/")
        );
        assert!(claims.not_before.is_some());
        assert_eq!(claims.raw["appid"], "channel-app");
    }

    #[test]
    fn v2_token_falls_back_to_azp() {
        let claims = Claims::try_from(json!({
            "iss": "https://login.microsoftonline.com/t1/v2.0",
            "aud": ["bot-app", "other"],
            "exp": 1_900_000_000,
            "azp": "caller",
            "tid": "t1",
            "ver": "2.0"
        }))
        .expect("claims parse");

        assert_eq!(claims.app_id.as_deref(), Some("caller"));
        assert_eq!(claims.tenant_id.as_deref(), Some("t1"));
        assert_eq!(claims.version.as_deref(), Some("2.0"));
        assert_eq!(claims.audience.len(), 2);
    }

    #[test]
    fn missing_issuer_is_rejected() {
        let err = Claims::try_from(json!({ "aud": "x", "exp": 1 })).expect_err("should fail");
        assert!(matches!(err, AuthError::InvalidJson(_)));
    }
}
