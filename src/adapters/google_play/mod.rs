//! Google Play purchase verification adapter.
//!
//! Implements the `PurchaseVerifier` trait against the androidpublisher
//! API. Authentication is a two-step service account flow: an RS256 JWT
//! is exchanged at the OAuth token endpoint for a bearer token, which is
//! cached until shortly before expiry.

use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::GooglePlayConfig;
use crate::domain::foundation::Timestamp;
use crate::domain::payment::{PaymentError, Plan, ProviderKind};
use crate::ports::{PurchaseVerifier, VerifiedPurchase};

const OAUTH_SCOPE: &str = "https://www.googleapis.com/auth/androidpublisher";
const OAUTH_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_API_BASE_URL: &str = "https://androidpublisher.googleapis.com";

/// JWT assertion lifetime requested from the token endpoint.
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Refresh the cached access token this long before it expires.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 600;

/// Google Play purchase verifier.
pub struct GooglePlayVerifier {
    config: GooglePlayConfig,
    http_client: reqwest::Client,
    token_url: String,
    api_base_url: String,
    token_cache: Mutex<Option<CachedToken>>,
}

struct CachedToken {
    access_token: String,
    expires_at: i64,
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Relevant fields of an androidpublisher subscription purchase.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionPurchase {
    /// 0 = payment pending, 1 = received, 2 = free trial.
    payment_state: Option<i64>,
    expiry_time_millis: Option<String>,
    order_id: Option<String>,
}

impl GooglePlayVerifier {
    /// Creates a new verifier with the given credentials.
    pub fn new(config: GooglePlayConfig, http_client: reqwest::Client) -> Self {
        Self {
            config,
            http_client,
            token_url: DEFAULT_TOKEN_URL.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            token_cache: Mutex::new(None),
        }
    }

    /// Override the Google endpoints (for testing).
    pub fn with_endpoints(mut self, token_url: impl Into<String>, api_base_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self.api_base_url = api_base_url.into();
        self
    }

    /// Returns a valid access token, exchanging a fresh assertion if the
    /// cached one is missing or close to expiry.
    async fn access_token(&self) -> Result<String, PaymentError> {
        let now = Timestamp::now().as_unix_secs();

        let mut cache = self.token_cache.lock().await;
        if let Some(cached) = cache.as_ref() {
            if cached.expires_at - TOKEN_REFRESH_MARGIN_SECS > now {
                return Ok(cached.access_token.clone());
            }
        }

        let assertion = self.build_assertion(now)?;
        let response = self
            .http_client
            .post(&self.token_url)
            .form(&[("grant_type", OAUTH_GRANT_TYPE), ("assertion", &assertion)])
            .send()
            .await
            .map_err(|e| PaymentError::infrastructure(format!("Google token exchange: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, error = %body, "Google token exchange rejected");
            return Err(PaymentError::verification_failed(format!(
                "Google token exchange failed with status {}",
                status
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| PaymentError::infrastructure(format!("Google token response: {}", e)))?;

        let expires_at = now + token.expires_in;
        *cache = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at,
        });

        Ok(token.access_token)
    }

    /// Builds the signed RS256 assertion for the token exchange.
    fn build_assertion(&self, now: i64) -> Result<String, PaymentError> {
        let claims = AssertionClaims {
            iss: &self.config.service_account_email,
            scope: OAUTH_SCOPE,
            aud: &self.token_url,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };

        let key = EncodingKey::from_rsa_pem(
            self.config.service_account_key.expose_secret().as_bytes(),
        )
        .map_err(|e| {
            PaymentError::infrastructure(format!("Invalid service account key: {}", e))
        })?;

        encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| PaymentError::infrastructure(format!("Failed to sign assertion: {}", e)))
    }
}

#[async_trait]
impl PurchaseVerifier for GooglePlayVerifier {
    fn provider(&self) -> ProviderKind {
        ProviderKind::GooglePlay
    }

    async fn verify(&self, token: &str, plan: &Plan) -> Result<VerifiedPurchase, PaymentError> {
        let subscription_id = plan
            .service_id_for(ProviderKind::GooglePlay)
            .unwrap_or_else(|| plan.id.as_str());

        let access_token = self.access_token().await?;
        let url = format!(
            "{}/androidpublisher/v3/applications/{}/purchases/subscriptions/{}/tokens/{}",
            self.api_base_url, self.config.package_name, subscription_id, token
        );

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&access_token)
            .send()
            .await
            .map_err(|e| PaymentError::infrastructure(format!("Google purchase lookup: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND
            || response.status() == reqwest::StatusCode::BAD_REQUEST
        {
            return Err(PaymentError::verification_failed(
                "Google Play does not recognize this purchase token",
            ));
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, error = %body, "Google purchase lookup failed");
            return Err(PaymentError::infrastructure(format!(
                "Google API returned status {}",
                status
            )));
        }

        let purchase: SubscriptionPurchase = response
            .json()
            .await
            .map_err(|e| PaymentError::infrastructure(format!("Google purchase response: {}", e)))?;

        evaluate_purchase(purchase, token, Timestamp::now())
    }
}

/// Decides whether a returned purchase counts as paid.
///
/// Payment states 0 (pending charge), 1 (received) and 2 (free trial)
/// are all acceptable; the purchase must not already be expired.
fn evaluate_purchase(
    purchase: SubscriptionPurchase,
    token: &str,
    now: Timestamp,
) -> Result<VerifiedPurchase, PaymentError> {
    match purchase.payment_state {
        Some(0) | Some(1) | Some(2) => {}
        other => {
            return Err(PaymentError::verification_failed(format!(
                "Unacceptable payment state: {:?}",
                other
            )));
        }
    }

    let expires_at = match purchase.expiry_time_millis.as_deref() {
        Some(millis) => {
            let millis: i64 = millis.parse().map_err(|_| {
                PaymentError::verification_failed("Malformed expiry time in Google response")
            })?;
            let expiry = Timestamp::from_unix_millis(millis);
            if expiry.is_before(&now) {
                return Err(PaymentError::verification_failed(
                    "Google Play subscription is already expired",
                ));
            }
            Some(expiry)
        }
        None => None,
    };

    Ok(VerifiedPurchase {
        // The order id is stable across replays; fall back to the token
        // for purchases Google has not yet assigned one.
        provider_reference: purchase.order_id.unwrap_or_else(|| token.to_string()),
        expires_at,
    })
}
