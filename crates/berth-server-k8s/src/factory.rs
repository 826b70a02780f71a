// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! The single seam deciding where agents come from.
//!
//! A process builds one [`AgentFactory`] at startup: the live factory
//! resolves stored credentials per request, the fixture factory hands out
//! agents over a fixed client. Request handlers only ever see the trait.

use std::sync::Arc;

use async_trait::async_trait;
use berth_common_secret::SecretString;
use berth_server_config::{AgentConfig, ServerConfig};
use chrono::Utc;
use tracing::{info, instrument};

use crate::agent::Agent;
use crate::client::ClusterClient;
use crate::credential::{ClusterId, CredentialStore, ProjectId};
use crate::error::{AgentError, AgentResult};
use crate::kube_client::KubeClusterClient;
use crate::kubeconfig::{issue_temporary_credential, TemporaryCredentialDocument};
use crate::oauth::{OAuthTokenRefresher, TokenRefresher};
use crate::resolver::{CredentialResolver, ResolvedClientConfig};

#[async_trait]
pub trait AgentFactory: Send + Sync {
	/// Build an agent for one request against `(cluster, project)`.
	async fn agent_for(&self, cluster_id: ClusterId, project_id: ProjectId) -> AgentResult<Agent>;

	/// Issue a temporary kubeconfig for `(cluster, project)`.
	async fn temporary_credential(
		&self,
		cluster_id: ClusterId,
		project_id: ProjectId,
	) -> AgentResult<TemporaryCredentialDocument>;
}

/// Resolves stored credentials and connects to the real cluster.
pub struct LiveAgentFactory {
	resolver: CredentialResolver,
	config: AgentConfig,
}

impl LiveAgentFactory {
	pub fn new(resolver: CredentialResolver, config: AgentConfig) -> Self {
		Self { resolver, config }
	}

	pub fn resolver(&self) -> &CredentialResolver {
		&self.resolver
	}
}

#[async_trait]
impl AgentFactory for LiveAgentFactory {
	#[instrument(skip(self), fields(cluster_id = %cluster_id, project_id = %project_id))]
	async fn agent_for(&self, cluster_id: ClusterId, project_id: ProjectId) -> AgentResult<Agent> {
		let resolved = self.resolver.resolve(cluster_id, project_id).await?;
		let client = KubeClusterClient::connect(&resolved, self.config.request_timeout()).await?;
		Ok(Agent::new(Arc::new(client), self.config.clone()))
	}

	#[instrument(skip(self), fields(cluster_id = %cluster_id, project_id = %project_id))]
	async fn temporary_credential(
		&self,
		cluster_id: ClusterId,
		project_id: ProjectId,
	) -> AgentResult<TemporaryCredentialDocument> {
		let resolved = self.resolver.resolve(cluster_id, project_id).await?;
		issue_temporary_credential(&resolved, self.config.kubeconfig_ttl(), Utc::now())
	}
}

/// Hands out agents over one fixed client regardless of cluster or project.
pub struct FixtureAgentFactory {
	client: Arc<dyn ClusterClient>,
	config: AgentConfig,
	credentials: ResolvedClientConfig,
}

impl FixtureAgentFactory {
	pub fn new(client: Arc<dyn ClusterClient>, config: AgentConfig) -> Self {
		let credentials = ResolvedClientConfig {
			cluster_id: ClusterId(0),
			project_id: ProjectId(0),
			server: "https://127.0.0.1:6443".to_string(),
			certificate_authority: None,
			insecure_skip_tls_verify: true,
			token: SecretString::from("fixture-token"),
			expires_at: None,
		};
		Self {
			client,
			config,
			credentials,
		}
	}

	/// Credentials embedded in issued fixture kubeconfigs.
	pub fn with_credentials(mut self, credentials: ResolvedClientConfig) -> Self {
		self.credentials = credentials;
		self
	}
}

#[async_trait]
impl AgentFactory for FixtureAgentFactory {
	async fn agent_for(&self, _cluster_id: ClusterId, _project_id: ProjectId) -> AgentResult<Agent> {
		Ok(Agent::new(self.client.clone(), self.config.clone()))
	}

	async fn temporary_credential(
		&self,
		_cluster_id: ClusterId,
		_project_id: ProjectId,
	) -> AgentResult<TemporaryCredentialDocument> {
		issue_temporary_credential(&self.credentials, self.config.kubeconfig_ttl(), Utc::now())
	}
}

/// Build the process-wide factory from configuration.
///
/// With `agent.testing` set, `fixture` is required and every request is
/// served by it; otherwise agents are resolved from `store`, refreshing
/// OAuth tokens through the configured provider.
pub fn build_agent_factory(
	config: &ServerConfig,
	store: Arc<dyn CredentialStore>,
	fixture: Option<Arc<dyn ClusterClient>>,
) -> AgentResult<Arc<dyn AgentFactory>> {
	if config.agent.testing {
		let client = fixture.ok_or_else(|| {
			AgentError::InvalidInput("testing mode requires a fixture cluster client".to_string())
		})?;
		info!("agent factory: fixture cluster");
		return Ok(Arc::new(FixtureAgentFactory::new(client, config.agent.clone())));
	}

	let refresher = match &config.oauth {
		Some(oauth) => {
			let refresher = OAuthTokenRefresher::new(oauth.clone(), config.agent.request_timeout())
				.map_err(|e| AgentError::InvalidInput(format!("invalid OAuth client: {e}")))?;
			Some(Arc::new(refresher) as Arc<dyn TokenRefresher>)
		}
		None => None,
	};
	info!(oauth = refresher.is_some(), "agent factory: live clusters");

	let resolver = CredentialResolver::new(store, refresher, &config.agent);
	Ok(Arc::new(LiveAgentFactory::new(resolver, config.agent.clone())))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::credential::InMemoryCredentialStore;
	use crate::testing::FakeCluster;

	fn testing_config() -> ServerConfig {
		let mut config = ServerConfig::default();
		config.agent.testing = true;
		config
	}

	#[tokio::test]
	async fn testing_mode_serves_fixture_for_any_cluster() {
		let cluster = FakeCluster::new();
		cluster.add_namespace("fixture-ns");

		let factory = build_agent_factory(
			&testing_config(),
			Arc::new(InMemoryCredentialStore::new()),
			Some(Arc::new(cluster.clone())),
		)
		.unwrap();

		let agent = factory.agent_for(ClusterId(99), ProjectId(42)).await.unwrap();
		let namespaces = agent.list_namespaces().await.unwrap();
		assert_eq!(namespaces.len(), 1);
	}

	#[test]
	fn testing_mode_without_fixture_is_rejected() {
		let result = build_agent_factory(
			&testing_config(),
			Arc::new(InMemoryCredentialStore::new()),
			None,
		);
		assert!(matches!(result, Err(AgentError::InvalidInput(_))));
	}

	#[tokio::test]
	async fn live_mode_surfaces_missing_credentials() {
		let factory = build_agent_factory(
			&ServerConfig::default(),
			Arc::new(InMemoryCredentialStore::new()),
			None,
		)
		.unwrap();
		let err = factory
			.temporary_credential(ClusterId(1), ProjectId(1))
			.await
			.unwrap_err();
		assert!(matches!(err, AgentError::CredentialUnavailable { .. }));
	}

	#[tokio::test]
	async fn fixture_issues_kubeconfig() {
		let factory = FixtureAgentFactory::new(Arc::new(FakeCluster::new()), AgentConfig::default());
		let doc = factory
			.temporary_credential(ClusterId(1), ProjectId(1))
			.await
			.unwrap();
		let json = String::from_utf8(doc.kubeconfig).unwrap();
		assert!(json.contains("https://127.0.0.1:6443"));
	}
}
