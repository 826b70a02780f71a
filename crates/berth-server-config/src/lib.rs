// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration for the Berth cluster agent.
//!
//! This crate provides:
//! - Layered configuration from multiple sources (defaults, TOML file, environment)
//! - Type-safe configuration with validation
//! - Consistent environment variable naming (`BERTH_SERVER_*`)
//! - Tracing subscriber setup from the logging section

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::ServerConfigLayer;
pub use sections::*;
pub use sources::{
	load_secret_env, ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource,
};

use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Fully resolved server configuration.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
	pub agent: AgentConfig,
	pub oauth: Option<OAuthConfig>,
	pub logging: LoggingConfig,
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`BERTH_SERVER_*`)
/// 2. Config file (`/etc/berth/server.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

fn load_from_sources(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<ServerConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = ServerConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		merged.merge(source.load()?);
	}

	finalize(merged)
}

/// Finalize configuration layer into resolved config.
pub fn finalize(layer: ServerConfigLayer) -> Result<ServerConfig, ConfigError> {
	let agent = layer.agent.unwrap_or_default().finalize()?;
	let oauth = layer.oauth.unwrap_or_default().build()?;
	let logging = layer.logging.unwrap_or_default().finalize();

	info!(
		request_timeout_secs = agent.request_timeout_secs,
		sidecar_timeout_secs = agent.sidecar_timeout_secs,
		testing = agent.testing,
		oauth_configured = oauth.is_some(),
		"Agent configuration loaded"
	);

	Ok(ServerConfig {
		agent,
		oauth,
		logging,
	})
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), ConfigError> {
	let filter = EnvFilter::try_from_default_env()
		.or_else(|_| EnvFilter::try_new(&config.level))
		.map_err(|e| ConfigError::InvalidValue {
			key: "logging.level".to_string(),
			message: e.to_string(),
		})?;

	let builder = tracing_subscriber::fmt().with_env_filter(filter);
	let result = if config.json {
		builder.json().try_init()
	} else {
		builder.try_init()
	};
	result.map_err(|e| ConfigError::Tracing(e.to_string()))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn finalize_empty_layer_uses_defaults() {
		let config = finalize(ServerConfigLayer::default()).unwrap();
		assert_eq!(config.agent, AgentConfig::default());
		assert!(config.oauth.is_none());
		assert_eq!(config.logging, LoggingConfig::default());
	}

	#[test]
	fn finalize_surfaces_section_validation() {
		let layer = ServerConfigLayer {
			agent: Some(AgentConfigLayer {
				request_timeout_secs: Some(0),
				..Default::default()
			}),
			..Default::default()
		};
		assert!(finalize(layer).is_err());
	}
}
