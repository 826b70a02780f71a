// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Cloud-provider OAuth configuration used to refresh cluster tokens.

use berth_common_secret::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// OAuth configuration layer (all fields optional for layering).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OAuthConfigLayer {
	/// Token endpoint used for the `refresh_token` grant.
	pub token_url: Option<String>,
	pub client_id: Option<String>,
	#[serde(skip_serializing)]
	pub client_secret: Option<SecretString>,
}

impl OAuthConfigLayer {
	pub fn merge(&mut self, other: OAuthConfigLayer) {
		if other.token_url.is_some() {
			self.token_url = other.token_url;
		}
		if other.client_id.is_some() {
			self.client_id = other.client_id;
		}
		if other.client_secret.is_some() {
			self.client_secret = other.client_secret;
		}
	}

	/// Build the final config, returning None when no provider is configured.
	pub fn build(self) -> Result<Option<OAuthConfig>, ConfigError> {
		let Some(client_id) = self.client_id.filter(|s| !s.is_empty()) else {
			return Ok(None);
		};

		let token_url = self.token_url.filter(|s| !s.is_empty()).ok_or_else(|| {
			ConfigError::Validation("oauth.token_url is required when client_id is set".to_string())
		})?;

		let client_secret = self.client_secret.ok_or_else(|| {
			ConfigError::Validation(
				"oauth.client_secret is required when client_id is set".to_string(),
			)
		})?;
		if client_secret.is_empty() {
			return Err(ConfigError::Validation(
				"oauth.client_secret cannot be empty".to_string(),
			));
		}

		Ok(Some(OAuthConfig {
			token_url,
			client_id,
			client_secret,
		}))
	}
}

/// Resolved OAuth configuration.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
	pub token_url: String,
	pub client_id: String,
	pub client_secret: SecretString,
}
