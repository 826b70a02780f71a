// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use berth_server_config::AgentConfig;
use tracing::{debug, instrument};

use crate::client::ClusterClient;
use crate::error::{AgentError, AgentResult};
use crate::ownership::LabelSet;
use crate::types::{ConfigMap, Ingress, Namespace, ObjectMeta, Pod};

/// Cluster operations for one request, backed by one resolved client.
///
/// Every call is bounded by the configured request timeout; a call that
/// exceeds it fails with [`AgentError::UpstreamUnavailable`].
#[derive(Clone)]
pub struct Agent {
	client: Arc<dyn ClusterClient>,
	config: Arc<AgentConfig>,
}

impl Agent {
	pub fn new(client: Arc<dyn ClusterClient>, config: AgentConfig) -> Self {
		Self {
			client,
			config: Arc::new(config),
		}
	}

	pub fn config(&self) -> &AgentConfig {
		&self.config
	}

	pub(crate) fn client(&self) -> &Arc<dyn ClusterClient> {
		&self.client
	}

	/// Run one cluster call under the request deadline.
	pub(crate) async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> AgentResult<T>
	where
		F: Future<Output = AgentResult<T>>,
	{
		let timeout = self.config.request_timeout();
		match tokio::time::timeout(timeout, fut).await {
			Ok(result) => result,
			Err(_) => Err(AgentError::upstream(format!(
				"{operation} timed out after {}s",
				timeout.as_secs()
			))),
		}
	}

	#[instrument(skip(self))]
	pub async fn list_namespaces(&self) -> AgentResult<Vec<Namespace>> {
		self
			.bounded("list namespaces", self.client.list_namespaces())
			.await
	}

	#[instrument(skip(self))]
	pub async fn get_config_map(&self, namespace: &str, name: &str) -> AgentResult<ConfigMap> {
		self
			.bounded("get configmap", self.client.get_config_map(namespace, name))
			.await
	}

	#[instrument(skip(self))]
	pub async fn list_config_maps(&self, namespace: &str) -> AgentResult<Vec<ConfigMap>> {
		self
			.bounded(
				"list configmaps",
				self.client.list_config_maps(namespace, None),
			)
			.await
	}

	#[instrument(skip(self, data))]
	pub async fn create_config_map(
		&self,
		namespace: &str,
		name: &str,
		data: BTreeMap<String, String>,
	) -> AgentResult<ConfigMap> {
		let cm = ConfigMap {
			metadata: ObjectMeta {
				name: Some(name.to_string()),
				namespace: Some(namespace.to_string()),
				..Default::default()
			},
			data: Some(data),
			..Default::default()
		};
		self
			.bounded("create configmap", self.client.create_config_map(namespace, cm))
			.await
	}

	/// Replace the data of an existing config map. Missing maps are an error.
	#[instrument(skip(self, data))]
	pub async fn update_config_map(
		&self,
		namespace: &str,
		name: &str,
		data: BTreeMap<String, String>,
	) -> AgentResult<ConfigMap> {
		let mut cm = self.get_config_map(namespace, name).await?;
		cm.data = Some(data);
		self
			.bounded("update configmap", self.client.replace_config_map(namespace, cm))
			.await
	}

	/// Delete a config map. Deleting an absent map succeeds.
	#[instrument(skip(self))]
	pub async fn delete_config_map(&self, namespace: &str, name: &str) -> AgentResult<()> {
		ignore_not_found(
			self
				.bounded("delete configmap", self.client.delete_config_map(namespace, name))
				.await,
		)
	}

	/// List pods matching any of the selectors, each pod reported once.
	#[instrument(skip(self, selectors), fields(selectors = selectors.len()))]
	pub async fn list_pods(
		&self,
		namespace: Option<&str>,
		selectors: &[LabelSet],
	) -> AgentResult<Vec<Pod>> {
		let mut seen = HashSet::new();
		let mut pods = Vec::new();
		for selector in selectors {
			let selector = selector.to_selector_string();
			let batch = self
				.bounded("list pods", self.client.list_pods(namespace, &selector))
				.await?;
			for pod in batch {
				let key = (
					pod.metadata.namespace.clone().unwrap_or_default(),
					pod.metadata.name.clone().unwrap_or_default(),
				);
				if seen.insert(key) {
					pods.push(pod);
				}
			}
		}
		debug!(count = pods.len(), "listed pods");
		Ok(pods)
	}

	/// Delete a pod. Deleting an absent pod succeeds.
	#[instrument(skip(self))]
	pub async fn delete_pod(&self, namespace: &str, name: &str) -> AgentResult<()> {
		ignore_not_found(
			self
				.bounded("delete pod", self.client.delete_pod(namespace, name))
				.await,
		)
	}

	#[instrument(skip(self))]
	pub async fn get_ingress(&self, namespace: &str, name: &str) -> AgentResult<Ingress> {
		self
			.bounded("get ingress", self.client.get_ingress(namespace, name))
			.await
	}
}

pub(crate) fn ignore_not_found(result: AgentResult<()>) -> AgentResult<()> {
	match result {
		Err(e) if e.is_not_found() => Ok(()),
		other => other,
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use super::*;
	use crate::ownership::Label;
	use crate::testing::{pod, FakeCluster};

	fn agent(cluster: &FakeCluster) -> Agent {
		Agent::new(Arc::new(cluster.clone()), AgentConfig::default())
	}

	fn selector(key: &str, value: &str) -> LabelSet {
		LabelSet::new().with(Label::new(key, value).unwrap())
	}

	#[tokio::test]
	async fn list_pods_deduplicates_across_selectors() {
		let cluster = FakeCluster::new();
		cluster.add_pod(pod("default", "web-1", &[("app", "web"), ("tier", "front")]));
		cluster.add_pod(pod("default", "web-2", &[("app", "web")]));
		cluster.add_pod(pod("default", "db-1", &[("tier", "back")]));

		let pods = agent(&cluster)
			.list_pods(
				Some("default"),
				&[selector("app", "web"), selector("tier", "front")],
			)
			.await
			.unwrap();

		let names: Vec<_> = pods
			.iter()
			.map(|p| p.metadata.name.clone().unwrap())
			.collect();
		assert_eq!(names, vec!["web-1", "web-2"]);
	}

	#[tokio::test]
	async fn delete_missing_config_map_is_ok() {
		let cluster = FakeCluster::new();
		agent(&cluster)
			.delete_config_map("default", "absent")
			.await
			.unwrap();
	}

	#[tokio::test]
	async fn update_missing_config_map_is_not_found() {
		let cluster = FakeCluster::new();
		let err = agent(&cluster)
			.update_config_map("default", "absent", BTreeMap::new())
			.await
			.unwrap_err();
		assert!(err.is_not_found());
	}

	#[tokio::test]
	async fn config_map_create_then_update() {
		let cluster = FakeCluster::new();
		let agent = agent(&cluster);
		agent
			.create_config_map(
				"default",
				"settings",
				BTreeMap::from([("A".to_string(), "1".to_string())]),
			)
			.await
			.unwrap();
		agent
			.update_config_map(
				"default",
				"settings",
				BTreeMap::from([("B".to_string(), "2".to_string())]),
			)
			.await
			.unwrap();

		let cm = agent.get_config_map("default", "settings").await.unwrap();
		assert_eq!(
			cm.data.unwrap(),
			BTreeMap::from([("B".to_string(), "2".to_string())])
		);
	}

	#[tokio::test(start_paused = true)]
	async fn slow_cluster_call_times_out() {
		let cluster = FakeCluster::new();
		cluster.set_latency(Duration::from_secs(120));
		let err = agent(&cluster).list_namespaces().await.unwrap_err();
		assert!(matches!(err, AgentError::UpstreamUnavailable { .. }));
	}
}
