// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Turns stored cluster credentials into time-bounded client configurations.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use berth_common_secret::SecretString;
use berth_server_config::AgentConfig;
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::credential::{AuthKind, ClusterCredential, ClusterId, CredentialStore, ProjectId};
use crate::error::{AgentError, AgentResult};
use crate::oauth::TokenRefresher;

/// Everything needed to open an API connection to one cluster.
///
/// Created per resolution and never persisted.
#[derive(Debug, Clone)]
pub struct ResolvedClientConfig {
	pub cluster_id: ClusterId,
	pub project_id: ProjectId,
	pub server: String,
	pub certificate_authority: Option<Vec<u8>>,
	pub insecure_skip_tls_verify: bool,
	pub token: SecretString,
	/// `None` for tokens without a known lifetime.
	pub expires_at: Option<DateTime<Utc>>,
}

impl ResolvedClientConfig {
	fn from_credential(credential: &ClusterCredential) -> Self {
		Self {
			cluster_id: credential.cluster_id,
			project_id: credential.project_id,
			server: credential.server.clone(),
			certificate_authority: credential.certificate_authority.clone(),
			insecure_skip_tls_verify: credential.insecure_skip_tls_verify,
			token: credential.token.clone(),
			expires_at: credential.expiry,
		}
	}

	pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
		self.expires_at.is_some_and(|at| at <= now)
	}
}

type RefreshKey = (ClusterId, ProjectId);

/// Resolves `(cluster, project)` pairs into [`ResolvedClientConfig`]s.
///
/// OAuth refreshes are single-flight per key: concurrent resolutions of the
/// same expired credential wait for one exchange and then reuse its result.
pub struct CredentialResolver {
	store: Arc<dyn CredentialStore>,
	refresher: Option<Arc<dyn TokenRefresher>>,
	expiry_skew: chrono::Duration,
	refresh_locks: Mutex<HashMap<RefreshKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl CredentialResolver {
	pub fn new(
		store: Arc<dyn CredentialStore>,
		refresher: Option<Arc<dyn TokenRefresher>>,
		config: &AgentConfig,
	) -> Self {
		Self::with_skew(store, refresher, config.token_expiry_skew())
	}

	pub fn with_skew(
		store: Arc<dyn CredentialStore>,
		refresher: Option<Arc<dyn TokenRefresher>>,
		expiry_skew: Duration,
	) -> Self {
		Self {
			store,
			refresher,
			expiry_skew: chrono::Duration::from_std(expiry_skew)
				.unwrap_or_else(|_| chrono::Duration::zero()),
			refresh_locks: Mutex::new(HashMap::new()),
		}
	}

	#[instrument(skip(self), fields(cluster_id = %cluster_id, project_id = %project_id))]
	pub async fn resolve(
		&self,
		cluster_id: ClusterId,
		project_id: ProjectId,
	) -> AgentResult<ResolvedClientConfig> {
		let credential = self.load_scoped(cluster_id, project_id).await?;

		match credential.auth_kind {
			AuthKind::RawToken | AuthKind::ServiceAccount => {
				if self.needs_refresh(credential.expiry, false) {
					return Err(AgentError::unauthorized(format!(
						"stored token for cluster {cluster_id} has expired"
					)));
				}
				debug!(auth_kind = ?credential.auth_kind, "resolved static credential");
				Ok(ResolvedClientConfig::from_credential(&credential))
			}
			AuthKind::CloudOauth => {
				if !self.needs_refresh(credential.expiry, true) {
					debug!("resolved cached OAuth token");
					return Ok(ResolvedClientConfig::from_credential(&credential));
				}
				self.refresh_and_resolve(cluster_id, project_id).await
			}
		}
	}

	/// Read the credential and enforce project ownership.
	async fn load_scoped(
		&self,
		cluster_id: ClusterId,
		project_id: ProjectId,
	) -> AgentResult<ClusterCredential> {
		let credential = self
			.store
			.get_credential(cluster_id, project_id)
			.await?
			.ok_or(AgentError::CredentialUnavailable {
				cluster_id: cluster_id.0,
			})?;

		if credential.project_id != project_id {
			warn!(
				owner_project_id = %credential.project_id,
				"credential requested from a project that does not own the cluster"
			);
			return Err(AgentError::unauthorized(format!(
				"cluster {cluster_id} is not accessible from project {project_id}"
			)));
		}

		Ok(credential)
	}

	/// Whether a token must be refreshed before use. OAuth tokens without a
	/// recorded expiry are refreshed; static tokens without one are trusted.
	fn needs_refresh(&self, expiry: Option<DateTime<Utc>>, missing_means_expired: bool) -> bool {
		match expiry {
			Some(at) => at <= Utc::now() + self.expiry_skew,
			None => missing_means_expired,
		}
	}

	fn refresh_lock(&self, key: RefreshKey) -> AgentResult<Arc<tokio::sync::Mutex<()>>> {
		let mut locks = self
			.refresh_locks
			.lock()
			.map_err(|_| AgentError::upstream("refresh lock table poisoned"))?;
		Ok(locks.entry(key).or_default().clone())
	}

	async fn refresh_and_resolve(
		&self,
		cluster_id: ClusterId,
		project_id: ProjectId,
	) -> AgentResult<ResolvedClientConfig> {
		let lock = self.refresh_lock((cluster_id, project_id))?;
		let _guard = lock.lock().await;

		// Another caller may have refreshed while we waited.
		let credential = self.load_scoped(cluster_id, project_id).await?;
		if !self.needs_refresh(credential.expiry, true) {
			debug!("OAuth token refreshed by a concurrent resolution");
			return Ok(ResolvedClientConfig::from_credential(&credential));
		}

		let refresh_failed = |message: String| AgentError::RefreshFailed {
			cluster_id: cluster_id.0,
			message,
		};

		let refresher = self
			.refresher
			.as_ref()
			.ok_or_else(|| refresh_failed("no OAuth provider configured".to_string()))?;

		let refreshed = refresher.refresh(&credential).await.map_err(|e| {
			warn!(error = %e, "OAuth token refresh failed");
			refresh_failed(e.to_string())
		})?;
		let new_expiry = refreshed.expiry;

		self
			.store
			.store_refreshed_token(cluster_id, project_id, refreshed)
			.await
			.map_err(|e| refresh_failed(format!("failed to persist refreshed token: {e}")))?;
		info!(expires_at = %new_expiry, "OAuth token refreshed");

		// Single retry: resolve again from the store, never refresh twice.
		let credential = self.load_scoped(cluster_id, project_id).await?;
		if self.needs_refresh(credential.expiry, true) {
			return Err(refresh_failed(
				"refreshed token is already expired".to_string(),
			));
		}
		Ok(ResolvedClientConfig::from_credential(&credential))
	}
}
