//! OAuth token exchange for service accounts
//!
//! Builds an RS256-signed JWT assertion from the credential and trades it
//! at the credential's `token_uri` for a bearer token.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use openssl::hash::MessageDigest;
use openssl::pkey::PKey;
use openssl::sign::Signer;
use serde::Deserialize;
use serde_json::json;

use super::Credential;
use crate::error::{Error, Result};
use crate::sheets::{RemoteError, RemoteResult};

/// Scope granting read/write access to spreadsheets.
pub const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

const ASSERTION_LIFETIME_SECS: i64 = 3600;

#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_LIFETIME_SECS
}

/// Build the signed JWT bearer assertion.
pub fn build_assertion(credential: &Credential, now: DateTime<Utc>) -> Result<String> {
    let mut header = json!({"alg": "RS256", "typ": "JWT"});
    if let Some(kid) = &credential.private_key_id {
        header["kid"] = json!(kid);
    }
    let issued = now.timestamp();
    let claims = json!({
        "iss": credential.client_email,
        "scope": SHEETS_SCOPE,
        "aud": credential.token_uri,
        "iat": issued,
        "exp": issued + ASSERTION_LIFETIME_SECS,
    });

    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?)
    );

    let key = PKey::private_key_from_pem(credential.private_key.as_bytes())
        .map_err(|e| Error::Auth(format!("private key is not valid PEM: {}", e)))?;
    let mut signer = Signer::new(MessageDigest::sha256(), &key)
        .map_err(|e| Error::Auth(format!("cannot sign with private key: {}", e)))?;
    signer
        .update(signing_input.as_bytes())
        .map_err(|e| Error::Auth(format!("signing failed: {}", e)))?;
    let signature = signer
        .sign_to_vec()
        .map_err(|e| Error::Auth(format!("signing failed: {}", e)))?;

    Ok(format!(
        "{}.{}",
        signing_input,
        URL_SAFE_NO_PAD.encode(signature)
    ))
}

/// One token request. Transport and HTTP failures come back unclassified so
/// the caller can run this under its retry policy.
pub async fn request_token(
    http_client: &reqwest::Client,
    credential: &Credential,
    assertion: &str,
) -> RemoteResult<AccessToken> {
    let response = http_client
        .post(&credential.token_uri)
        .form(&[
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("assertion", assertion),
        ])
        .send()
        .await
        .map_err(crate::sheets::transport_error)?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown".to_string());
        // The token endpoint answers bad grants with 400; treat as unauthorized.
        let status = if status.as_u16() == 400 { 401 } else { status.as_u16() };
        return Err(RemoteError::status(
            status,
            format!("token exchange rejected: {}", body.trim()),
        ));
    }

    let parsed: TokenResponse = response
        .json()
        .await
        .map_err(|e| RemoteError::other(format!("failed to parse token response: {}", e)))?;
    Ok(AccessToken {
        token: parsed.access_token,
        expires_at: Utc::now() + Duration::seconds(parsed.expires_in),
    })
}
