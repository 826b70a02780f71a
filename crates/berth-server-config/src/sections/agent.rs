// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Cluster agent configuration section.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_STREAM_WRITE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_SIDECAR_TIMEOUT_SECS: u64 = 15;
const DEFAULT_SIDECAR_CONTAINER: &str = "sidecar";
const DEFAULT_TOKEN_EXPIRY_SKEW_SECS: u64 = 60;
const DEFAULT_KUBECONFIG_TTL_SECS: u64 = 900;

fn default_sidecar_stop_command() -> Vec<String> {
	vec!["/signal.sh".to_string(), "SIGTERM".to_string()]
}

/// Agent configuration layer (for merging).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AgentConfigLayer {
	/// Upper bound for a single cluster API call.
	pub request_timeout_secs: Option<u64>,
	/// Upper bound for a single downstream frame write before the client is
	/// considered gone.
	pub stream_write_timeout_secs: Option<u64>,
	/// Upper bound for the job sidecar to acknowledge a stop signal.
	pub sidecar_timeout_secs: Option<u64>,
	pub sidecar_container: Option<String>,
	pub sidecar_stop_command: Option<Vec<String>>,
	/// Tokens expiring within this window are treated as already expired.
	pub token_expiry_skew_secs: Option<u64>,
	/// Lifetime of issued temporary kubeconfigs.
	pub kubeconfig_ttl_secs: Option<u64>,
	/// Substitute the fixture cluster for every resolution.
	pub testing: Option<bool>,
}

impl AgentConfigLayer {
	pub fn merge(&mut self, other: AgentConfigLayer) {
		if other.request_timeout_secs.is_some() {
			self.request_timeout_secs = other.request_timeout_secs;
		}
		if other.stream_write_timeout_secs.is_some() {
			self.stream_write_timeout_secs = other.stream_write_timeout_secs;
		}
		if other.sidecar_timeout_secs.is_some() {
			self.sidecar_timeout_secs = other.sidecar_timeout_secs;
		}
		if other.sidecar_container.is_some() {
			self.sidecar_container = other.sidecar_container;
		}
		if other.sidecar_stop_command.is_some() {
			self.sidecar_stop_command = other.sidecar_stop_command;
		}
		if other.token_expiry_skew_secs.is_some() {
			self.token_expiry_skew_secs = other.token_expiry_skew_secs;
		}
		if other.kubeconfig_ttl_secs.is_some() {
			self.kubeconfig_ttl_secs = other.kubeconfig_ttl_secs;
		}
		if other.testing.is_some() {
			self.testing = other.testing;
		}
	}

	pub fn finalize(self) -> Result<AgentConfig, ConfigError> {
		let config = AgentConfig {
			request_timeout_secs: self
				.request_timeout_secs
				.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
			stream_write_timeout_secs: self
				.stream_write_timeout_secs
				.unwrap_or(DEFAULT_STREAM_WRITE_TIMEOUT_SECS),
			sidecar_timeout_secs: self
				.sidecar_timeout_secs
				.unwrap_or(DEFAULT_SIDECAR_TIMEOUT_SECS),
			sidecar_container: self
				.sidecar_container
				.unwrap_or_else(|| DEFAULT_SIDECAR_CONTAINER.to_string()),
			sidecar_stop_command: self
				.sidecar_stop_command
				.unwrap_or_else(default_sidecar_stop_command),
			token_expiry_skew_secs: self
				.token_expiry_skew_secs
				.unwrap_or(DEFAULT_TOKEN_EXPIRY_SKEW_SECS),
			kubeconfig_ttl_secs: self
				.kubeconfig_ttl_secs
				.unwrap_or(DEFAULT_KUBECONFIG_TTL_SECS),
			testing: self.testing.unwrap_or(false),
		};
		config.validate()?;
		Ok(config)
	}
}

/// Resolved agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
	pub request_timeout_secs: u64,
	pub stream_write_timeout_secs: u64,
	pub sidecar_timeout_secs: u64,
	pub sidecar_container: String,
	pub sidecar_stop_command: Vec<String>,
	pub token_expiry_skew_secs: u64,
	pub kubeconfig_ttl_secs: u64,
	pub testing: bool,
}

impl Default for AgentConfig {
	fn default() -> Self {
		Self {
			request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
			stream_write_timeout_secs: DEFAULT_STREAM_WRITE_TIMEOUT_SECS,
			sidecar_timeout_secs: DEFAULT_SIDECAR_TIMEOUT_SECS,
			sidecar_container: DEFAULT_SIDECAR_CONTAINER.to_string(),
			sidecar_stop_command: default_sidecar_stop_command(),
			token_expiry_skew_secs: DEFAULT_TOKEN_EXPIRY_SKEW_SECS,
			kubeconfig_ttl_secs: DEFAULT_KUBECONFIG_TTL_SECS,
			testing: false,
		}
	}
}

impl AgentConfig {
	pub fn request_timeout(&self) -> Duration {
		Duration::from_secs(self.request_timeout_secs)
	}

	pub fn stream_write_timeout(&self) -> Duration {
		Duration::from_secs(self.stream_write_timeout_secs)
	}

	pub fn sidecar_timeout(&self) -> Duration {
		Duration::from_secs(self.sidecar_timeout_secs)
	}

	pub fn token_expiry_skew(&self) -> Duration {
		Duration::from_secs(self.token_expiry_skew_secs)
	}

	pub fn kubeconfig_ttl(&self) -> Duration {
		Duration::from_secs(self.kubeconfig_ttl_secs)
	}

	fn validate(&self) -> Result<(), ConfigError> {
		for (key, value) in [
			("agent.request_timeout_secs", self.request_timeout_secs),
			(
				"agent.stream_write_timeout_secs",
				self.stream_write_timeout_secs,
			),
			("agent.sidecar_timeout_secs", self.sidecar_timeout_secs),
			("agent.kubeconfig_ttl_secs", self.kubeconfig_ttl_secs),
		] {
			if value == 0 {
				return Err(ConfigError::InvalidValue {
					key: key.to_string(),
					message: "must be greater than zero".to_string(),
				});
			}
		}
		if self.sidecar_container.is_empty() {
			return Err(ConfigError::Validation(
				"agent.sidecar_container cannot be empty".to_string(),
			));
		}
		if self.sidecar_stop_command.is_empty() {
			return Err(ConfigError::Validation(
				"agent.sidecar_stop_command cannot be empty".to_string(),
			));
		}
		Ok(())
	}
}
