// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: environment variables and TOML files.

use std::path::PathBuf;
use std::{env, fs};

use berth_common_secret::SecretString;
use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::ServerConfigLayer;
use crate::sections::{AgentConfigLayer, LoggingConfigLayer, OAuthConfigLayer};

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<ServerConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(ServerConfigLayer::default())
	}
}

/// TOML file configuration source.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new("/etc/berth/server.toml")
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(ServerConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: ServerConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: BERTH_SERVER_<SECTION>_<FIELD>
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Ok(ServerConfigLayer {
			agent: Some(load_agent_from_env()?),
			oauth: Some(load_oauth_from_env()?),
			logging: Some(load_logging_from_env()),
		})
	}
}

fn env_var(name: &str) -> Option<String> {
	env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_bool(name: &str) -> Option<bool> {
	env_var(name).map(|v| v.eq_ignore_ascii_case("true") || v == "1")
}

fn env_u64(name: &str) -> Result<Option<u64>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid u64 value '{v}'"),
		}),
		None => Ok(None),
	}
}

/// Whitespace-separated argv, e.g. `/signal.sh SIGTERM`.
fn env_command(name: &str) -> Option<Vec<String>> {
	env_var(name).map(|v| v.split_whitespace().map(str::to_string).collect())
}

/// Load a secret from `VAR`, or from the file named by `VAR_FILE`.
///
/// The file form wins when both are set. A single trailing newline is
/// stripped from file contents.
pub fn load_secret_env(var: &str) -> Result<Option<SecretString>, ConfigError> {
	let file_var = format!("{var}_FILE");

	if let Ok(path) = env::var(&file_var) {
		if path.is_empty() {
			return Err(ConfigError::Secret(format!(
				"secret file path in {file_var} is empty"
			)));
		}
		let path = PathBuf::from(path);
		let content = fs::read_to_string(&path).map_err(|e| ConfigError::FileRead {
			path: path.clone(),
			source: e,
		})?;
		let value = content.strip_suffix('\n').unwrap_or(&content).to_string();
		return Ok(Some(SecretString::new(value)));
	}

	Ok(env::var(var).ok().map(SecretString::new))
}

fn load_agent_from_env() -> Result<AgentConfigLayer, ConfigError> {
	Ok(AgentConfigLayer {
		request_timeout_secs: env_u64("BERTH_SERVER_AGENT_REQUEST_TIMEOUT_SECS")?,
		stream_write_timeout_secs: env_u64("BERTH_SERVER_AGENT_STREAM_WRITE_TIMEOUT_SECS")?,
		sidecar_timeout_secs: env_u64("BERTH_SERVER_AGENT_SIDECAR_TIMEOUT_SECS")?,
		sidecar_container: env_var("BERTH_SERVER_AGENT_SIDECAR_CONTAINER"),
		sidecar_stop_command: env_command("BERTH_SERVER_AGENT_SIDECAR_STOP_COMMAND"),
		token_expiry_skew_secs: env_u64("BERTH_SERVER_AGENT_TOKEN_EXPIRY_SKEW_SECS")?,
		kubeconfig_ttl_secs: env_u64("BERTH_SERVER_AGENT_KUBECONFIG_TTL_SECS")?,
		testing: env_bool("BERTH_SERVER_AGENT_TESTING"),
	})
}

fn load_oauth_from_env() -> Result<OAuthConfigLayer, ConfigError> {
	Ok(OAuthConfigLayer {
		token_url: env_var("BERTH_SERVER_OAUTH_TOKEN_URL"),
		client_id: env_var("BERTH_SERVER_OAUTH_CLIENT_ID"),
		client_secret: load_secret_env("BERTH_SERVER_OAUTH_CLIENT_SECRET")?,
	})
}

fn load_logging_from_env() -> LoggingConfigLayer {
	LoggingConfigLayer {
		level: env_var("BERTH_SERVER_LOG_LEVEL"),
		json: env_bool("BERTH_SERVER_LOG_JSON"),
	}
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use super::*;

	#[test]
	fn missing_toml_file_yields_empty_layer() {
		let source = TomlSource::new("/nonexistent/berth/server.toml");
		let layer = source.load().unwrap();
		assert!(layer.agent.is_none());
	}

	#[test]
	fn toml_file_is_parsed() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(
			file,
			r#"
[agent]
request_timeout_secs = 5
sidecar_stop_command = ["/bin/kill", "-TERM", "1"]

[logging]
json = true
"#
		)
		.unwrap();

		let layer = TomlSource::new(file.path()).load().unwrap();
		let agent = layer.agent.unwrap();
		assert_eq!(agent.request_timeout_secs, Some(5));
		assert_eq!(
			agent.sidecar_stop_command,
			Some(vec![
				"/bin/kill".to_string(),
				"-TERM".to_string(),
				"1".to_string()
			])
		);
		assert_eq!(layer.logging.unwrap().json, Some(true));
	}

	#[test]
	fn malformed_toml_is_an_error() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "[agent\nrequest_timeout_secs = ").unwrap();

		let err = TomlSource::new(file.path()).load().unwrap_err();
		assert!(matches!(err, ConfigError::TomlParse { .. }));
	}

	#[test]
	fn precedence_orders_sources() {
		assert!(Precedence::Defaults < Precedence::ConfigFile);
		assert!(Precedence::ConfigFile < Precedence::Environment);
	}
}
