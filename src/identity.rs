//! Bearer-token resolution against the external identity service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::warn;

use crate::error::{Error, Result};

pub const ADMIN_ROLE: &str = "ADMIN";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub role: String,
    pub username: Option<String>,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }

    pub fn require_admin(&self) -> Result<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(Error::Forbidden("admin role required".to_string()))
        }
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn resolve(&self, token: &str) -> Result<Identity>;
}

#[derive(Deserialize)]
#[serde(untagged)]
enum UserId {
    Text(String),
    Number(i64),
}

#[derive(Deserialize)]
struct MeResponse {
    id: UserId,
    #[serde(default)]
    role: String,
    username: Option<String>,
}

/// Calls the identity service's "current user" endpoint with the token.
pub struct HttpIdentityProvider {
    client: reqwest::Client,
    me_url: String,
}

impl HttpIdentityProvider {
    pub fn new(me_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("failed to build identity client: {e}")))?;
        Ok(Self {
            client,
            me_url: me_url.into(),
        })
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn resolve(&self, token: &str) -> Result<Identity> {
        let response = self
            .client
            .get(&self.me_url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| {
                warn!(url = %self.me_url, error = %e, "identity service unreachable");
                Error::UpstreamUnavailable(format!("auth service unavailable: {e}"))
            })?;

        match response.status() {
            StatusCode::OK => {}
            status if status.is_server_error() => {
                return Err(Error::UpstreamUnavailable(format!(
                    "auth service answered {status}"
                )));
            }
            _ => return Err(Error::Unauthorized),
        }

        let me: MeResponse = response
            .json()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("malformed identity response: {e}")))?;

        Ok(Identity {
            id: match me.id {
                UserId::Text(id) => id,
                UserId::Number(id) => id.to_string(),
            },
            role: me.role,
            username: me.username,
        })
    }
}

/// Extracts the token from an `Authorization: Bearer ...` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str> {
    header
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(Error::Unauthorized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_token_requires_scheme_and_value() {
        assert_eq!(bearer_token(Some("Bearer abc")).ok(), Some("abc"));
        assert!(bearer_token(Some("Basic abc")).is_err());
        assert!(bearer_token(Some("Bearer   ")).is_err());
        assert!(bearer_token(None).is_err());
    }

    #[test]
    fn only_admin_role_passes_admin_check() {
        let admin = Identity {
            id: "1".to_string(),
            role: "ADMIN".to_string(),
            username: None,
        };
        let student = Identity {
            role: "STUDENT".to_string(),
            ..admin.clone()
        };
        assert!(admin.require_admin().is_ok());
        assert!(matches!(student.require_admin(), Err(Error::Forbidden(_))));
    }

    #[test]
    fn numeric_and_text_ids_both_decode() {
        let numeric: MeResponse =
            serde_json::from_str(r#"{"id": 42, "role": "ADMIN", "username": "ada"}"#).unwrap();
        assert!(matches!(numeric.id, UserId::Number(42)));
        let text: MeResponse = serde_json::from_str(r#"{"id": "u-7"}"#).unwrap();
        assert!(matches!(text.id, UserId::Text(ref id) if id == "u-7"));
        assert_eq!(text.role, "");
    }

    #[tokio::test]
    async fn unreachable_service_is_reported_as_unavailable() {
        let provider =
            HttpIdentityProvider::new("http://127.0.0.1:9/api/auth/me", Duration::from_millis(500))
                .unwrap();
        let result = provider.resolve("token").await;
        assert!(matches!(result, Err(Error::UpstreamUnavailable(_))));
    }
}
