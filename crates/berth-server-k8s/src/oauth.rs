// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! OAuth refresh exchange for cloud-provider cluster tokens.

use std::time::Duration;

use async_trait::async_trait;
use berth_common_secret::SecretString;
use berth_server_config::OAuthConfig;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::credential::{ClusterCredential, RefreshedToken};

/// Lifetime assumed when the provider omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

#[derive(Debug, Error)]
pub enum RefreshError {
	#[error("credential has no refresh token")]
	MissingRefreshToken,

	#[error("HTTP request failed: {0}")]
	HttpRequest(#[from] reqwest::Error),

	#[error("provider rejected refresh: {0}")]
	Provider(String),

	#[error("failed to parse token response: {0}")]
	Parse(String),
}

/// Exchanges a stored refresh token for a new access token.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
	async fn refresh(&self, credential: &ClusterCredential) -> Result<RefreshedToken, RefreshError>;
}

#[derive(Deserialize)]
struct TokenResponse {
	access_token: SecretString,
	#[serde(default)]
	refresh_token: Option<SecretString>,
	#[serde(default)]
	expires_in: Option<i64>,
}

#[derive(Deserialize)]
struct ErrorResponse {
	error: String,
	#[serde(default)]
	error_description: Option<String>,
}

/// `refresh_token` grant against a standard OAuth 2.0 token endpoint.
pub struct OAuthTokenRefresher {
	config: OAuthConfig,
	http_client: reqwest::Client,
}

impl OAuthTokenRefresher {
	pub fn new(config: OAuthConfig, timeout: Duration) -> Result<Self, RefreshError> {
		let http_client = reqwest::Client::builder()
			.timeout(timeout)
			.connect_timeout(timeout)
			.build()?;
		Ok(Self {
			config,
			http_client,
		})
	}
}

#[async_trait]
impl TokenRefresher for OAuthTokenRefresher {
	#[tracing::instrument(skip(self, credential), fields(cluster_id = %credential.cluster_id))]
	async fn refresh(&self, credential: &ClusterCredential) -> Result<RefreshedToken, RefreshError> {
		let refresh_token = credential
			.refresh_token
			.as_ref()
			.ok_or(RefreshError::MissingRefreshToken)?;

		tracing::debug!("exchanging refresh token");

		let response = self
			.http_client
			.post(&self.config.token_url)
			.header("Content-Type", "application/x-www-form-urlencoded")
			.form(&[
				("client_id", self.config.client_id.as_str()),
				("client_secret", self.config.client_secret.expose().as_str()),
				("refresh_token", refresh_token.expose().as_str()),
				("grant_type", "refresh_token"),
			])
			.send()
			.await?;

		let status = response.status();
		let body = response.text().await?;

		if let Ok(error_response) = serde_json::from_str::<ErrorResponse>(&body) {
			if !error_response.error.is_empty() {
				let message = error_response
					.error_description
					.unwrap_or(error_response.error);
				return Err(RefreshError::Provider(message));
			}
		}
		if !status.is_success() {
			return Err(RefreshError::Provider(format!("token endpoint returned {status}")));
		}

		let parsed: TokenResponse =
			serde_json::from_str(&body).map_err(|e| RefreshError::Parse(e.to_string()))?;
		if parsed.access_token.is_empty() {
			return Err(RefreshError::Parse("empty access_token".to_string()));
		}

		let expiry = expiry_after(parsed.expires_in, Utc::now())?;
		Ok(RefreshedToken {
			access_token: parsed.access_token,
			refresh_token: parsed.refresh_token,
			expiry,
		})
	}
}

/// Absolute expiry for a provider-reported `expires_in`. Non-positive or
/// unrepresentable lifetimes are rejected.
fn expiry_after(
	expires_in: Option<i64>,
	now: DateTime<Utc>,
) -> Result<DateTime<Utc>, RefreshError> {
	let secs = expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
	if secs <= 0 {
		return Err(RefreshError::Parse(format!(
			"expires_in must be positive, got {secs}"
		)));
	}
	chrono::Duration::try_seconds(secs)
		.and_then(|lifetime| now.checked_add_signed(lifetime))
		.ok_or_else(|| RefreshError::Parse(format!("expires_in out of range: {secs}")))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn token_response_parses_without_optional_fields() {
		let parsed: TokenResponse = serde_json::from_str(r#"{"access_token":"ya29.abc"}"#).unwrap();
		assert_eq!(parsed.access_token.expose(), "ya29.abc");
		assert!(parsed.refresh_token.is_none());
		assert!(parsed.expires_in.is_none());
	}

	#[test]
	fn error_response_prefers_description() {
		let parsed: ErrorResponse = serde_json::from_str(
			r#"{"error":"invalid_grant","error_description":"Token has been revoked."}"#,
		)
		.unwrap();
		assert_eq!(parsed.error, "invalid_grant");
		assert_eq!(
			parsed.error_description.as_deref(),
			Some("Token has been revoked.")
		);
	}

	#[test]
	fn expiry_defaults_to_one_hour() {
		let now = Utc::now();
		assert_eq!(
			expiry_after(None, now).unwrap(),
			now + chrono::Duration::seconds(DEFAULT_EXPIRES_IN_SECS)
		);
	}

	#[test]
	fn expiry_rejects_non_positive_and_overflowing_lifetimes() {
		let now = Utc::now();
		for secs in [0, -5, i64::MIN, i64::MAX, i64::MAX / 1000 + 1] {
			assert!(
				matches!(expiry_after(Some(secs), now), Err(RefreshError::Parse(_))),
				"expires_in {secs} should be rejected"
			);
		}
	}

	fn config_for(token_url: String) -> OAuthConfig {
		OAuthConfig {
			token_url,
			client_id: "berth".to_string(),
			client_secret: SecretString::from("s3cret"),
		}
	}

	fn credential() -> ClusterCredential {
		ClusterCredential {
			cluster_id: crate::credential::ClusterId(1),
			project_id: crate::credential::ProjectId(1),
			server: "https://10.0.0.1:6443".to_string(),
			certificate_authority: None,
			insecure_skip_tls_verify: false,
			auth_kind: crate::credential::AuthKind::CloudOauth,
			token: SecretString::from("old"),
			refresh_token: Some(SecretString::from("refresh")),
			expiry: None,
		}
	}

	/// Serve one HTTP response with `body` on a local port.
	async fn serve_once(body: &'static str) -> String {
		use tokio::io::{AsyncReadExt, AsyncWriteExt};

		let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		tokio::spawn(async move {
			let (mut socket, _) = listener.accept().await.unwrap();
			let mut request = Vec::new();
			let mut buf = [0u8; 4096];
			loop {
				let n = socket.read(&mut buf).await.unwrap();
				if n == 0 {
					break;
				}
				request.extend_from_slice(&buf[..n]);
				let text = String::from_utf8_lossy(&request);
				if let Some(end) = text.find("\r\n\r\n") {
					let length = text[..end]
						.lines()
						.find_map(|l| {
							let (k, v) = l.split_once(':')?;
							k.eq_ignore_ascii_case("content-length")
								.then(|| v.trim().parse::<usize>().ok())
								.flatten()
						})
						.unwrap_or(0);
					if request.len() >= end + 4 + length {
						break;
					}
				}
			}
			let response = format!(
				"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
				body.len(),
				body
			);
			socket.write_all(response.as_bytes()).await.unwrap();
			socket.shutdown().await.unwrap();
		});
		format!("http://{addr}/token")
	}

	#[tokio::test]
	async fn huge_expires_in_is_a_parse_error() {
		let url = serve_once(r#"{"access_token":"a","expires_in":9223372036854775807}"#).await;
		let refresher = OAuthTokenRefresher::new(config_for(url), Duration::from_secs(5)).unwrap();

		let err = refresher.refresh(&credential()).await.unwrap_err();
		assert!(matches!(err, RefreshError::Parse(_)));
	}

	#[tokio::test]
	async fn successful_exchange_sets_expiry() {
		let url = serve_once(r#"{"access_token":"fresh","expires_in":120}"#).await;
		let refresher = OAuthTokenRefresher::new(config_for(url), Duration::from_secs(5)).unwrap();

		let before = Utc::now();
		let token = refresher.refresh(&credential()).await.unwrap();
		assert_eq!(token.access_token.expose(), "fresh");
		assert!(token.expiry >= before + chrono::Duration::seconds(120));
	}

	#[test]
	fn refresher_builds_with_timeout() {
		let config = OAuthConfig {
			token_url: "https://oauth2.example.com/token".to_string(),
			client_id: "berth".to_string(),
			client_secret: SecretString::from("s3cret"),
		};
		assert!(OAuthTokenRefresher::new(config, Duration::from_secs(5)).is_ok());
	}
}
