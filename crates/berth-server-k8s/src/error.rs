// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::fmt;

use thiserror::Error;

/// Result type alias for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;

/// Why a stream session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
	/// A downstream write failed or timed out.
	ClientDisconnected,
	/// The cluster source finished cleanly.
	UpstreamEnded,
	/// The cluster source failed.
	UpstreamError(String),
	/// The session's cancellation token fired.
	Cancelled,
}

impl fmt::Display for CloseReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			CloseReason::ClientDisconnected => f.write_str("client disconnected"),
			CloseReason::UpstreamEnded => f.write_str("upstream ended"),
			CloseReason::UpstreamError(message) => write!(f, "upstream error: {message}"),
			CloseReason::Cancelled => f.write_str("cancelled"),
		}
	}
}

/// Which step of a linked bundle mutation broke the pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundlePhase {
	Secret,
	ConfigMap,
	Verify,
}

impl fmt::Display for BundlePhase {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			BundlePhase::Secret => f.write_str("secret"),
			BundlePhase::ConfigMap => f.write_str("configmap"),
			BundlePhase::Verify => f.write_str("verify"),
		}
	}
}

/// Errors surfaced by every agent operation.
#[derive(Error, Debug)]
pub enum AgentError {
	#[error("no stored credential for cluster {cluster_id}")]
	CredentialUnavailable { cluster_id: u64 },

	#[error("token refresh failed for cluster {cluster_id}: {message}")]
	RefreshFailed { cluster_id: u64, message: String },

	#[error("unauthorized: {message}")]
	Unauthorized { message: String },

	#[error("cluster API unavailable: {message}")]
	UpstreamUnavailable { message: String },

	#[error("{kind} not found: {name}")]
	NotFound { kind: &'static str, name: String },

	#[error("linked bundle {namespace}/{name} inconsistent at {phase} (secret written: {secret_written}): {detail}")]
	ConsistencyViolation {
		name: String,
		namespace: String,
		phase: BundlePhase,
		secret_written: bool,
		detail: String,
	},

	#[error("sidecar unreachable for job {namespace}/{job}: {message}")]
	SidecarUnreachable {
		namespace: String,
		job: String,
		message: String,
	},

	#[error("stream terminated: {0}")]
	StreamTerminated(CloseReason),

	#[error("cluster rejected request ({code}): {message}")]
	Rejected { code: u16, message: String },

	#[error("invalid input: {0}")]
	InvalidInput(String),
}

impl AgentError {
	pub(crate) fn unauthorized(message: impl Into<String>) -> Self {
		AgentError::Unauthorized {
			message: message.into(),
		}
	}

	pub(crate) fn upstream(message: impl Into<String>) -> Self {
		AgentError::UpstreamUnavailable {
			message: message.into(),
		}
	}

	pub(crate) fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
		AgentError::NotFound {
			kind,
			name: name.into(),
		}
	}

	/// Translate a kube error, attributing a 404 to the named object.
	pub(crate) fn from_kube(err: kube::Error, kind: &'static str, name: &str) -> Self {
		match err {
			kube::Error::Api(ref resp) if resp.code == 404 => AgentError::not_found(kind, name),
			other => other.into(),
		}
	}

	pub fn is_not_found(&self) -> bool {
		matches!(self, AgentError::NotFound { .. })
	}

	/// Returns true if this error should be logged at error level.
	pub fn is_internal(&self) -> bool {
		matches!(
			self,
			AgentError::RefreshFailed { .. }
				| AgentError::UpstreamUnavailable { .. }
				| AgentError::ConsistencyViolation { .. }
		)
	}

	/// Returns the HTTP status code for this error.
	pub fn status_code(&self) -> u16 {
		match self {
			AgentError::InvalidInput(_) => 400,
			AgentError::Unauthorized { .. } => 403,
			AgentError::CredentialUnavailable { .. } | AgentError::NotFound { .. } => 404,
			AgentError::ConsistencyViolation { .. } => 409,
			AgentError::Rejected { code, .. } => *code,
			AgentError::RefreshFailed { .. } => 502,
			AgentError::UpstreamUnavailable { .. } => 503,
			AgentError::SidecarUnreachable { .. } => 504,
			AgentError::StreamTerminated(_) => 500,
		}
	}
}

impl From<kube::Error> for AgentError {
	fn from(err: kube::Error) -> Self {
		match err {
			kube::Error::Api(resp) => match resp.code {
				401 | 403 => AgentError::unauthorized(resp.message),
				404 => AgentError::not_found("resource", resp.message),
				code if code >= 500 => AgentError::upstream(resp.message),
				code => AgentError::Rejected {
					code,
					message: resp.message,
				},
			},
			kube::Error::Auth(e) => AgentError::unauthorized(e.to_string()),
			other => AgentError::upstream(other.to_string()),
		}
	}
}

#[cfg(test)]
mod tests {
	use kube::core::ErrorResponse;

	use super::*;

	fn api_error(code: u16) -> kube::Error {
		kube::Error::Api(ErrorResponse {
			status: "Failure".to_string(),
			message: format!("status {code}"),
			reason: String::new(),
			code,
		})
	}

	#[test]
	fn kube_status_codes_map_to_taxonomy() {
		assert!(matches!(
			AgentError::from(api_error(401)),
			AgentError::Unauthorized { .. }
		));
		assert!(matches!(
			AgentError::from(api_error(403)),
			AgentError::Unauthorized { .. }
		));
		assert!(AgentError::from(api_error(404)).is_not_found());
		assert!(matches!(
			AgentError::from(api_error(503)),
			AgentError::UpstreamUnavailable { .. }
		));
		assert!(matches!(
			AgentError::from(api_error(409)),
			AgentError::Rejected { code: 409, .. }
		));
	}

	#[test]
	fn from_kube_names_the_missing_object() {
		let err = AgentError::from_kube(api_error(404), "configmap", "web-env");
		assert_eq!(err.to_string(), "configmap not found: web-env");
	}

	#[test]
	fn status_codes() {
		assert_eq!(AgentError::unauthorized("x").status_code(), 403);
		assert_eq!(AgentError::not_found("pod", "p").status_code(), 404);
		assert_eq!(
			AgentError::SidecarUnreachable {
				namespace: "default".into(),
				job: "migrate".into(),
				message: "timeout".into(),
			}
			.status_code(),
			504
		);
	}

	#[test]
	fn upstream_errors_are_internal() {
		assert!(AgentError::upstream("boom").is_internal());
		assert!(!AgentError::not_found("pod", "p").is_internal());
	}
}
