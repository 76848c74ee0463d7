use crate::errors::{Error, Result};
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

const SCOPES: &str = "https://www.googleapis.com/auth/firebase.database \
                      https://www.googleapis.com/auth/userinfo.email";
const GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Google service-account fields needed for the JWT bearer grant
#[derive(Clone)]
pub struct ServiceAccount {
    pub project_id: Option<String>,
    pub private_key_id: Option<String>,
    pub private_key: String,
    pub client_email: String,
    pub token_uri: String,
}

impl fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

#[derive(Clone)]
pub enum Credentials {
    ServiceAccount(ServiceAccount),
    /// Legacy database secret, sent as the `auth` query parameter.
    DatabaseSecret(String),
    Anonymous,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::ServiceAccount(account) => {
                f.debug_tuple("ServiceAccount").field(account).finish()
            }
            Credentials::DatabaseSecret(_) => f.write_str("DatabaseSecret(<redacted>)"),
            Credentials::Anonymous => f.write_str("Anonymous"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Produces the query parameter that authenticates database requests,
/// exchanging service-account credentials for a cached access token.
pub struct TokenSource {
    credentials: Credentials,
    client: Client,
    cache: Mutex<Option<CachedToken>>,
}

impl TokenSource {
    pub fn new(credentials: Credentials, client: Client) -> Self {
        Self {
            credentials,
            client,
            cache: Mutex::new(None),
        }
    }

    pub async fn query_param(&self) -> Result<Option<(&'static str, String)>> {
        match &self.credentials {
            Credentials::Anonymous => Ok(None),
            Credentials::DatabaseSecret(secret) => Ok(Some(("auth", secret.clone()))),
            Credentials::ServiceAccount(account) => {
                let token = self.access_token(account).await?;
                Ok(Some(("access_token", token)))
            }
        }
    }

    async fn access_token(&self, account: &ServiceAccount) -> Result<String> {
        let mut cache = self.cache.lock().await;

        if let Some(token) = cache.as_ref() {
            if token.expires_at > Instant::now() + REFRESH_MARGIN {
                return Ok(token.value.clone());
            }
            debug!("Access token close to expiry, refreshing");
        }

        let fresh = self.exchange(account).await?;
        let value = fresh.value.clone();
        *cache = Some(fresh);
        Ok(value)
    }

    async fn exchange(&self, account: &ServiceAccount) -> Result<CachedToken> {
        let assertion = sign_assertion(account, Utc::now().timestamp())?;

        let response = self
            .client
            .post(&account.token_uri)
            .form(&[("grant_type", GRANT_TYPE), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Auth(format!(
                "token endpoint returned {}: {}",
                status.as_u16(),
                body
            )));
        }

        let token: TokenResponse = response.json().await?;
        let lifetime = token
            .expires_in
            .unwrap_or(ASSERTION_LIFETIME_SECS as u64);
        info!(
            "Obtained access token for {} (expires in {}s)",
            account.client_email, lifetime
        );

        Ok(CachedToken {
            value: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(lifetime),
        })
    }
}

/// Signs the RS256 assertion presented to the token endpoint.
pub fn sign_assertion(account: &ServiceAccount, issued_at: i64) -> Result<String> {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = account.private_key_id.clone();

    let claims = Claims {
        iss: account.client_email.clone(),
        scope: SCOPES.to_string(),
        aud: account.token_uri.clone(),
        iat: issued_at,
        exp: issued_at + ASSERTION_LIFETIME_SECS,
    };

    let key = EncodingKey::from_rsa_pem(account.private_key.as_bytes())?;
    Ok(encode(&header, &claims, &key)?)
}
