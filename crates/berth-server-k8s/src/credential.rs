// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Stored cluster credentials and the store abstraction the resolver reads
//! them from.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use berth_common_secret::SecretString;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, AgentResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClusterId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjectId(pub u64);

impl fmt::Display for ClusterId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl fmt::Display for ProjectId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// How the stored secret material authenticates against the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthKind {
	/// A bearer token used as-is.
	RawToken,
	/// A cloud-provider OAuth access token with a refresh token.
	CloudOauth,
	/// A service account token used as-is.
	ServiceAccount,
}

/// A tenant's stored credential for one cluster.
///
/// Owned by the persistence layer; the agent only reads it and writes back
/// refreshed OAuth tokens.
#[derive(Debug, Clone)]
pub struct ClusterCredential {
	pub cluster_id: ClusterId,
	pub project_id: ProjectId,
	/// API server URL, e.g. `https://10.0.0.1:6443`.
	pub server: String,
	/// PEM bundle for the API server's CA.
	pub certificate_authority: Option<Vec<u8>>,
	pub insecure_skip_tls_verify: bool,
	pub auth_kind: AuthKind,
	/// Bearer token (raw, service account, or current OAuth access token).
	pub token: SecretString,
	pub refresh_token: Option<SecretString>,
	/// Expiry of `token`, when known.
	pub expiry: Option<DateTime<Utc>>,
}

/// Result of a successful OAuth refresh exchange.
#[derive(Debug, Clone)]
pub struct RefreshedToken {
	pub access_token: SecretString,
	/// Some providers rotate the refresh token on every exchange.
	pub refresh_token: Option<SecretString>,
	pub expiry: DateTime<Utc>,
}

/// Read/write access to stored cluster credentials.
///
/// Credentials are addressed by `(cluster, project)`: two projects may hold
/// credentials for the same cluster ID without seeing each other's.
#[async_trait]
pub trait CredentialStore: Send + Sync {
	/// Look up the credential `project_id` holds for `cluster_id`.
	///
	/// Implementations that can tell the cluster exists under another
	/// project may return [`AgentError::Unauthorized`] instead of `None`.
	async fn get_credential(
		&self,
		cluster_id: ClusterId,
		project_id: ProjectId,
	) -> AgentResult<Option<ClusterCredential>>;

	/// Persist a refreshed token for the credential `project_id` holds.
	async fn store_refreshed_token(
		&self,
		cluster_id: ClusterId,
		project_id: ProjectId,
		token: RefreshedToken,
	) -> AgentResult<()>;
}

type CredentialKey = (ClusterId, ProjectId);

/// Credential store held in memory.
///
/// Used by tests and by deployments that load credentials from a file at
/// startup.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCredentialStore {
	credentials: Arc<Mutex<HashMap<CredentialKey, ClusterCredential>>>,
	writes: Arc<Mutex<u32>>,
}

impl InMemoryCredentialStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Insert or replace the credential for its `(cluster, project)`.
	pub fn insert(&self, credential: ClusterCredential) {
		if let Ok(mut creds) = self.credentials.lock() {
			creds.insert((credential.cluster_id, credential.project_id), credential);
		}
	}

	/// Snapshot of a stored credential.
	pub fn get(&self, cluster_id: ClusterId, project_id: ProjectId) -> Option<ClusterCredential> {
		self
			.credentials
			.lock()
			.ok()
			.and_then(|creds| creds.get(&(cluster_id, project_id)).cloned())
	}

	/// Number of refreshed-token writes accepted so far.
	pub fn write_count(&self) -> u32 {
		self.writes.lock().map(|w| *w).unwrap_or(0)
	}
}

fn foreign_project(cluster_id: ClusterId, project_id: ProjectId) -> AgentError {
	AgentError::unauthorized(format!(
		"cluster {cluster_id} is not accessible from project {project_id}"
	))
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
	async fn get_credential(
		&self,
		cluster_id: ClusterId,
		project_id: ProjectId,
	) -> AgentResult<Option<ClusterCredential>> {
		let creds = self
			.credentials
			.lock()
			.map_err(|_| AgentError::upstream("credential store lock poisoned"))?;
		if let Some(cred) = creds.get(&(cluster_id, project_id)) {
			return Ok(Some(cred.clone()));
		}
		if creds.keys().any(|(cluster, _)| *cluster == cluster_id) {
			return Err(foreign_project(cluster_id, project_id));
		}
		Ok(None)
	}

	async fn store_refreshed_token(
		&self,
		cluster_id: ClusterId,
		project_id: ProjectId,
		token: RefreshedToken,
	) -> AgentResult<()> {
		let mut creds = self
			.credentials
			.lock()
			.map_err(|_| AgentError::upstream("credential store lock poisoned"))?;
		let Some(cred) = creds.get_mut(&(cluster_id, project_id)) else {
			return Err(if creds.keys().any(|(cluster, _)| *cluster == cluster_id) {
				foreign_project(cluster_id, project_id)
			} else {
				AgentError::CredentialUnavailable {
					cluster_id: cluster_id.0,
				}
			});
		};

		cred.token = token.access_token;
		if let Some(refresh) = token.refresh_token {
			cred.refresh_token = Some(refresh);
		}
		cred.expiry = Some(token.expiry);
		drop(creds);

		if let Ok(mut writes) = self.writes.lock() {
			*writes += 1;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use chrono::Duration;

	use super::*;

	fn credential(project: u64) -> ClusterCredential {
		ClusterCredential {
			cluster_id: ClusterId(7),
			project_id: ProjectId(project),
			server: "https://10.0.0.1:6443".to_string(),
			certificate_authority: None,
			insecure_skip_tls_verify: false,
			auth_kind: AuthKind::CloudOauth,
			token: SecretString::from("old-access"),
			refresh_token: Some(SecretString::from("refresh-1")),
			expiry: None,
		}
	}

	#[tokio::test]
	async fn refreshed_token_is_written_back() {
		let store = InMemoryCredentialStore::new();
		store.insert(credential(1));

		let expiry = Utc::now() + Duration::hours(1);
		store
			.store_refreshed_token(
				ClusterId(7),
				ProjectId(1),
				RefreshedToken {
					access_token: SecretString::from("new-access"),
					refresh_token: None,
					expiry,
				},
			)
			.await
			.unwrap();

		let stored = store.get(ClusterId(7), ProjectId(1)).unwrap();
		assert_eq!(stored.token.expose(), "new-access");
		assert_eq!(stored.refresh_token.unwrap().expose(), "refresh-1");
		assert_eq!(stored.expiry, Some(expiry));
		assert_eq!(store.write_count(), 1);
	}

	#[tokio::test]
	async fn write_from_foreign_project_is_rejected() {
		let store = InMemoryCredentialStore::new();
		store.insert(credential(1));

		let err = store
			.store_refreshed_token(
				ClusterId(7),
				ProjectId(2),
				RefreshedToken {
					access_token: SecretString::from("stolen"),
					refresh_token: None,
					expiry: Utc::now(),
				},
			)
			.await
			.unwrap_err();

		assert!(matches!(err, AgentError::Unauthorized { .. }));
		assert_eq!(
			store.get(ClusterId(7), ProjectId(1)).unwrap().token.expose(),
			"old-access"
		);
		assert_eq!(store.write_count(), 0);
	}

	#[tokio::test]
	async fn colliding_cluster_ids_stay_separate_per_project() {
		let store = InMemoryCredentialStore::new();
		store.insert(credential(1));
		let mut second = credential(2);
		second.token = SecretString::from("other-project-access");
		store.insert(second);

		let first = store
			.get_credential(ClusterId(7), ProjectId(1))
			.await
			.unwrap()
			.unwrap();
		let other = store
			.get_credential(ClusterId(7), ProjectId(2))
			.await
			.unwrap()
			.unwrap();
		assert_eq!(first.token.expose(), "old-access");
		assert_eq!(other.token.expose(), "other-project-access");
	}

	#[tokio::test]
	async fn unknown_project_for_known_cluster_is_unauthorized() {
		let store = InMemoryCredentialStore::new();
		store.insert(credential(1));

		let err = store
			.get_credential(ClusterId(7), ProjectId(9))
			.await
			.unwrap_err();
		assert!(matches!(err, AgentError::Unauthorized { .. }));
		assert!(store
			.get_credential(ClusterId(8), ProjectId(1))
			.await
			.unwrap()
			.is_none());
	}

	#[test]
	fn credential_debug_is_redacted() {
		let out = format!("{:?}", credential(1));
		assert!(!out.contains("old-access"));
		assert!(!out.contains("refresh-1"));
	}

	#[test]
	fn auth_kind_serializes_kebab_case() {
		assert_eq!(
			serde_json::to_string(&AuthKind::CloudOauth).unwrap(),
			"\"cloud-oauth\""
		);
		assert_eq!(
			serde_json::from_str::<AuthKind>("\"service-account\"").unwrap(),
			AuthKind::ServiceAccount
		);
	}
}
