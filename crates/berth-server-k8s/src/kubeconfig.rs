// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Kubeconfig documents: the connection format for the live client and the
//! temporary credential handed to external tools.

use std::fmt;
use std::time::Duration;

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{AgentError, AgentResult};
use crate::resolver::ResolvedClientConfig;

/// Kubeconfig structure.
#[derive(Debug, Serialize, Deserialize)]
pub struct Kubeconfig {
	#[serde(rename = "apiVersion")]
	pub api_version: String,
	pub kind: String,
	pub clusters: Vec<KubeconfigCluster>,
	pub users: Vec<KubeconfigUser>,
	pub contexts: Vec<KubeconfigContext>,
	#[serde(rename = "current-context")]
	pub current_context: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KubeconfigCluster {
	pub name: String,
	pub cluster: ClusterConfig,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClusterConfig {
	pub server: String,
	/// PEM bundle, base64 encoded.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub certificate_authority_data: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub insecure_skip_tls_verify: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KubeconfigUser {
	pub name: String,
	pub user: UserConfig,
}

#[derive(Serialize, Deserialize)]
pub struct UserConfig {
	pub token: String,
}

impl fmt::Debug for UserConfig {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("UserConfig")
			.field("token", &berth_common_secret::REDACTED)
			.finish()
	}
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KubeconfigContext {
	pub name: String,
	pub context: ContextConfig,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ContextConfig {
	pub cluster: String,
	pub user: String,
}

impl Kubeconfig {
	/// Single-context kubeconfig for one resolved cluster connection.
	pub fn for_resolved(resolved: &ResolvedClientConfig) -> Self {
		let name = format!("berth-cluster-{}", resolved.cluster_id);
		let certificate_authority_data = resolved
			.certificate_authority
			.as_ref()
			.map(|pem| base64::engine::general_purpose::STANDARD.encode(pem));

		Kubeconfig {
			api_version: "v1".to_string(),
			kind: "Config".to_string(),
			clusters: vec![KubeconfigCluster {
				name: name.clone(),
				cluster: ClusterConfig {
					server: resolved.server.clone(),
					certificate_authority_data,
					insecure_skip_tls_verify: resolved.insecure_skip_tls_verify.then_some(true),
				},
			}],
			users: vec![KubeconfigUser {
				name: name.clone(),
				user: UserConfig {
					token: resolved.token.expose().clone(),
				},
			}],
			contexts: vec![KubeconfigContext {
				name: name.clone(),
				context: ContextConfig {
					cluster: name.clone(),
					user: name.clone(),
				},
			}],
			current_context: name,
		}
	}

	/// Serialize as JSON; kubectl and client libraries accept JSON kubeconfigs.
	pub fn to_json(&self) -> AgentResult<Vec<u8>> {
		serde_json::to_vec_pretty(self)
			.map_err(|e| AgentError::InvalidInput(format!("failed to serialize kubeconfig: {e}")))
	}

	/// Convert into the kube client's own kubeconfig type.
	pub(crate) fn into_kube(self) -> AgentResult<kube::config::Kubeconfig> {
		let value = serde_json::to_value(&self)
			.map_err(|e| AgentError::InvalidInput(format!("failed to serialize kubeconfig: {e}")))?;
		serde_json::from_value(value)
			.map_err(|e| AgentError::InvalidInput(format!("invalid kubeconfig: {e}")))
	}
}

/// A time-bounded cluster credential for an external caller.
///
/// Carries only the access token; refresh tokens and provider client
/// secrets never leave the credential store.
#[derive(Clone, Serialize)]
pub struct TemporaryCredentialDocument {
	/// JSON kubeconfig.
	#[serde(with = "base64_bytes")]
	pub kubeconfig: Vec<u8>,
	pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for TemporaryCredentialDocument {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TemporaryCredentialDocument")
			.field("kubeconfig", &format_args!("<{} bytes>", self.kubeconfig.len()))
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

mod base64_bytes {
	use base64::Engine;
	use serde::Serializer;

	pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
	}
}

/// Issue a temporary kubeconfig. The document expires at the earlier of
/// `now + ttl` and the access token's own expiry.
pub fn issue_temporary_credential(
	resolved: &ResolvedClientConfig,
	ttl: Duration,
	now: DateTime<Utc>,
) -> AgentResult<TemporaryCredentialDocument> {
	if resolved.is_expired_at(now) {
		return Err(AgentError::unauthorized(format!(
			"credential for cluster {} has expired",
			resolved.cluster_id
		)));
	}

	let ttl = chrono::Duration::from_std(ttl)
		.map_err(|e| AgentError::InvalidInput(format!("invalid kubeconfig ttl: {e}")))?;
	let mut expires_at = now + ttl;
	if let Some(token_expiry) = resolved.expires_at {
		expires_at = expires_at.min(token_expiry);
	}

	let kubeconfig = Kubeconfig::for_resolved(resolved).to_json()?;
	info!(
		cluster_id = %resolved.cluster_id,
		project_id = %resolved.project_id,
		expires_at = %expires_at,
		"issued temporary kubeconfig"
	);

	Ok(TemporaryCredentialDocument {
		kubeconfig,
		expires_at,
	})
}

#[cfg(test)]
mod tests {
	use berth_common_secret::SecretString;

	use super::*;
	use crate::credential::{ClusterId, ProjectId};

	fn resolved(expires_at: Option<DateTime<Utc>>) -> ResolvedClientConfig {
		ResolvedClientConfig {
			cluster_id: ClusterId(3),
			project_id: ProjectId(4),
			server: "https://k8s.example.com".to_string(),
			certificate_authority: Some(b"-----BEGIN CERTIFICATE-----\n".to_vec()),
			insecure_skip_tls_verify: false,
			token: SecretString::from("access-token"),
			expires_at,
		}
	}

	#[test]
	fn kubeconfig_has_single_context() {
		let doc = Kubeconfig::for_resolved(&resolved(None));
		assert_eq!(doc.current_context, "berth-cluster-3");
		assert_eq!(doc.clusters.len(), 1);
		assert_eq!(doc.users[0].user.token, "access-token");
		assert!(doc.clusters[0].cluster.certificate_authority_data.is_some());
		assert!(doc.clusters[0].cluster.insecure_skip_tls_verify.is_none());
	}

	#[test]
	fn kubeconfig_json_uses_kubectl_field_names() {
		let json = String::from_utf8(Kubeconfig::for_resolved(&resolved(None)).to_json().unwrap())
			.unwrap();
		assert!(json.contains("\"apiVersion\""));
		assert!(json.contains("\"current-context\""));
		assert!(json.contains("\"certificate-authority-data\""));
	}

	#[test]
	fn user_debug_hides_token() {
		let doc = Kubeconfig::for_resolved(&resolved(None));
		assert!(!format!("{doc:?}").contains("access-token"));
	}

	#[test]
	fn converts_to_kube_kubeconfig() {
		let kube_config = Kubeconfig::for_resolved(&resolved(None)).into_kube().unwrap();
		assert_eq!(kube_config.current_context.as_deref(), Some("berth-cluster-3"));
		assert_eq!(kube_config.clusters.len(), 1);
	}

	#[test]
	fn document_is_bounded_by_ttl() {
		let now = Utc::now();
		let doc = issue_temporary_credential(&resolved(None), Duration::from_secs(900), now).unwrap();
		assert_eq!(doc.expires_at, now + chrono::Duration::seconds(900));
	}

	#[test]
	fn document_is_bounded_by_token_expiry() {
		let now = Utc::now();
		let token_expiry = now + chrono::Duration::seconds(120);
		let doc = issue_temporary_credential(
			&resolved(Some(token_expiry)),
			Duration::from_secs(900),
			now,
		)
		.unwrap();
		assert_eq!(doc.expires_at, token_expiry);
	}

	#[test]
	fn document_never_contains_refresh_material() {
		let doc =
			issue_temporary_credential(&resolved(None), Duration::from_secs(60), Utc::now()).unwrap();
		let json = String::from_utf8(doc.kubeconfig).unwrap();
		assert!(json.contains("access-token"));
		assert!(!json.contains("refresh"));
	}

	#[test]
	fn expired_credential_is_not_issued() {
		let now = Utc::now();
		let err = issue_temporary_credential(
			&resolved(Some(now - chrono::Duration::seconds(1))),
			Duration::from_secs(60),
			now,
		)
		.unwrap_err();
		assert!(matches!(err, AgentError::Unauthorized { .. }));
	}
}
