// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::AgentResult;
use crate::types::{
	ConfigMap, ControllerEventStream, ControllerKind, ExecOutcome, Ingress, Job, LogOptions,
	LogStream, Namespace, Pod, Secret, Service,
};

/// Raw cluster API operations the agent is built on.
///
/// One instance talks to one cluster with one resolved credential. Every
/// method translates transport and API failures into [`AgentError`]; a
/// missing object is [`AgentError::NotFound`].
///
/// `namespace: None` on list operations means all namespaces.
///
/// [`AgentError`]: crate::AgentError
/// [`AgentError::NotFound`]: crate::AgentError::NotFound
#[async_trait]
pub trait ClusterClient: Send + Sync {
	async fn list_namespaces(&self) -> AgentResult<Vec<Namespace>>;

	async fn get_config_map(&self, namespace: &str, name: &str) -> AgentResult<ConfigMap>;

	async fn list_config_maps(
		&self,
		namespace: &str,
		label_selector: Option<&str>,
	) -> AgentResult<Vec<ConfigMap>>;

	async fn create_config_map(&self, namespace: &str, cm: ConfigMap) -> AgentResult<ConfigMap>;

	/// Replace an existing config map wholesale.
	async fn replace_config_map(&self, namespace: &str, cm: ConfigMap) -> AgentResult<ConfigMap>;

	async fn delete_config_map(&self, namespace: &str, name: &str) -> AgentResult<()>;

	async fn get_secret(&self, namespace: &str, name: &str) -> AgentResult<Secret>;

	async fn create_secret(&self, namespace: &str, secret: Secret) -> AgentResult<Secret>;

	async fn replace_secret(&self, namespace: &str, secret: Secret) -> AgentResult<Secret>;

	async fn delete_secret(&self, namespace: &str, name: &str) -> AgentResult<()>;

	/// List pods matching a label selector.
	async fn list_pods(
		&self,
		namespace: Option<&str>,
		label_selector: &str,
	) -> AgentResult<Vec<Pod>>;

	async fn delete_pod(&self, namespace: &str, name: &str) -> AgentResult<()>;

	async fn get_ingress(&self, namespace: &str, name: &str) -> AgentResult<Ingress>;

	async fn list_ingresses(&self, namespace: Option<&str>) -> AgentResult<Vec<Ingress>>;

	async fn get_job(&self, namespace: &str, name: &str) -> AgentResult<Job>;

	async fn list_jobs(&self, namespace: Option<&str>, label_selector: &str) -> AgentResult<Vec<Job>>;

	async fn list_services(
		&self,
		namespace: Option<&str>,
		label_selector: &str,
	) -> AgentResult<Vec<Service>>;

	/// GET an API-server path (e.g. a service proxy URL) and return the body
	/// verbatim.
	async fn proxy_get(&self, path_and_query: &str) -> AgentResult<Bytes>;

	/// Run a command in a container and wait for it to finish.
	async fn exec(
		&self,
		namespace: &str,
		pod: &str,
		container: &str,
		command: &[String],
	) -> AgentResult<ExecOutcome>;

	/// Open a log stream for a pod.
	async fn stream_logs(
		&self,
		namespace: &str,
		pod: &str,
		opts: LogOptions,
	) -> AgentResult<LogStream>;

	/// Open a watch on all controllers of `kind` in a namespace.
	///
	/// The watch handle lives inside the returned stream; dropping the stream
	/// releases it.
	async fn watch_controllers(
		&self,
		namespace: &str,
		kind: ControllerKind,
	) -> AgentResult<ControllerEventStream>;
}
