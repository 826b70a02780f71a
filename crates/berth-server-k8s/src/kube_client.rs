// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use k8s_openapi::NamespaceResourceScope;
use kube::{
	api::{Api, AttachParams, DeleteParams, ListParams, LogParams, PostParams},
	client::Body,
	config::KubeConfigOptions,
	core::ErrorResponse,
	runtime::watcher::{self, Event},
	Client, Resource,
};
use serde::de::DeserializeOwned;
use tokio::io::AsyncReadExt;
use tokio_util::compat::FuturesAsyncReadCompatExt;
use tracing::{debug, instrument};

use crate::client::ClusterClient;
use crate::error::{AgentError, AgentResult};
use crate::kubeconfig::Kubeconfig;
use crate::resolver::ResolvedClientConfig;
use crate::types::{
	ConfigMap, ControllerEvent, ControllerEventStream, ControllerKind, ControllerObject,
	DaemonSet, Deployment, ExecOutcome, Ingress, Job, LogOptions, LogStream, Namespace, Pod,
	ReplicaSet, Secret, Service, StatefulSet,
};

/// Production cluster client implementation using the kube crate.
pub struct KubeClusterClient {
	client: Client,
}

impl KubeClusterClient {
	pub fn new(client: Client) -> Self {
		Self { client }
	}

	/// Build a client for a resolved credential.
	///
	/// Only connection establishment is bounded here; request deadlines are
	/// applied by the agent so that long-lived watches and log follows are
	/// not cut off by a read timeout.
	pub async fn connect(
		resolved: &ResolvedClientConfig,
		connect_timeout: Duration,
	) -> AgentResult<Self> {
		let kubeconfig = Kubeconfig::for_resolved(resolved).into_kube()?;
		let mut config =
			kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
				.await
				.map_err(|e| AgentError::InvalidInput(format!("invalid cluster configuration: {e}")))?;
		config.connect_timeout = Some(connect_timeout);

		let client = Client::try_from(config)?;
		debug!(cluster_id = %resolved.cluster_id, server = %resolved.server, "K8s client initialized");
		Ok(Self { client })
	}

	fn namespaced<K>(&self, namespace: &str) -> Api<K>
	where
		K: Resource<Scope = NamespaceResourceScope>,
		<K as Resource>::DynamicType: Default,
	{
		Api::namespaced(self.client.clone(), namespace)
	}

	fn scoped<K>(&self, namespace: Option<&str>) -> Api<K>
	where
		K: Resource<Scope = NamespaceResourceScope>,
		<K as Resource>::DynamicType: Default,
	{
		match namespace {
			Some(ns) => Api::namespaced(self.client.clone(), ns),
			None => Api::all(self.client.clone()),
		}
	}
}

/// Wrap a watcher into a stream of controller events.
fn controller_events<K>(api: Api<K>, wrap: fn(K) -> ControllerObject) -> ControllerEventStream
where
	K: Resource + Clone + DeserializeOwned + Debug + Send + 'static,
{
	let events = watcher::watcher(api, watcher::Config::default()).filter_map(move |event| async move {
		match event {
			Ok(Event::Apply(obj)) | Ok(Event::InitApply(obj)) => {
				Some(Ok(ControllerEvent::Applied(wrap(obj))))
			}
			Ok(Event::Delete(obj)) => Some(Ok(ControllerEvent::Deleted(wrap(obj)))),
			Ok(Event::Init) | Ok(Event::InitDone) => None,
			Err(e) => Some(Err(AgentError::upstream(format!("watch failed: {e}")))),
		}
	});
	Box::pin(events)
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
	async fn list_namespaces(&self) -> AgentResult<Vec<Namespace>> {
		let namespaces: Api<Namespace> = Api::all(self.client.clone());
		Ok(namespaces.list(&ListParams::default()).await?.items)
	}

	async fn get_config_map(&self, namespace: &str, name: &str) -> AgentResult<ConfigMap> {
		self
			.namespaced::<ConfigMap>(namespace)
			.get(name)
			.await
			.map_err(|e| AgentError::from_kube(e, "configmap", name))
	}

	async fn list_config_maps(
		&self,
		namespace: &str,
		label_selector: Option<&str>,
	) -> AgentResult<Vec<ConfigMap>> {
		let mut lp = ListParams::default();
		if let Some(selector) = label_selector {
			lp = lp.labels(selector);
		}
		Ok(self.namespaced::<ConfigMap>(namespace).list(&lp).await?.items)
	}

	async fn create_config_map(&self, namespace: &str, cm: ConfigMap) -> AgentResult<ConfigMap> {
		Ok(self
			.namespaced::<ConfigMap>(namespace)
			.create(&PostParams::default(), &cm)
			.await?)
	}

	async fn replace_config_map(&self, namespace: &str, cm: ConfigMap) -> AgentResult<ConfigMap> {
		let name = cm.metadata.name.clone().unwrap_or_default();
		self
			.namespaced::<ConfigMap>(namespace)
			.replace(&name, &PostParams::default(), &cm)
			.await
			.map_err(|e| AgentError::from_kube(e, "configmap", &name))
	}

	async fn delete_config_map(&self, namespace: &str, name: &str) -> AgentResult<()> {
		self
			.namespaced::<ConfigMap>(namespace)
			.delete(name, &DeleteParams::default())
			.await
			.map(|_| ())
			.map_err(|e| AgentError::from_kube(e, "configmap", name))
	}

	async fn get_secret(&self, namespace: &str, name: &str) -> AgentResult<Secret> {
		self
			.namespaced::<Secret>(namespace)
			.get(name)
			.await
			.map_err(|e| AgentError::from_kube(e, "secret", name))
	}

	async fn create_secret(&self, namespace: &str, secret: Secret) -> AgentResult<Secret> {
		Ok(self
			.namespaced::<Secret>(namespace)
			.create(&PostParams::default(), &secret)
			.await?)
	}

	async fn replace_secret(&self, namespace: &str, secret: Secret) -> AgentResult<Secret> {
		let name = secret.metadata.name.clone().unwrap_or_default();
		self
			.namespaced::<Secret>(namespace)
			.replace(&name, &PostParams::default(), &secret)
			.await
			.map_err(|e| AgentError::from_kube(e, "secret", &name))
	}

	async fn delete_secret(&self, namespace: &str, name: &str) -> AgentResult<()> {
		self
			.namespaced::<Secret>(namespace)
			.delete(name, &DeleteParams::default())
			.await
			.map(|_| ())
			.map_err(|e| AgentError::from_kube(e, "secret", name))
	}

	async fn list_pods(
		&self,
		namespace: Option<&str>,
		label_selector: &str,
	) -> AgentResult<Vec<Pod>> {
		let lp = ListParams::default().labels(label_selector);
		Ok(self.scoped::<Pod>(namespace).list(&lp).await?.items)
	}

	async fn delete_pod(&self, namespace: &str, name: &str) -> AgentResult<()> {
		self
			.namespaced::<Pod>(namespace)
			.delete(name, &DeleteParams::default())
			.await
			.map(|_| ())
			.map_err(|e| AgentError::from_kube(e, "pod", name))
	}

	async fn get_ingress(&self, namespace: &str, name: &str) -> AgentResult<Ingress> {
		self
			.namespaced::<Ingress>(namespace)
			.get(name)
			.await
			.map_err(|e| AgentError::from_kube(e, "ingress", name))
	}

	async fn list_ingresses(&self, namespace: Option<&str>) -> AgentResult<Vec<Ingress>> {
		Ok(self
			.scoped::<Ingress>(namespace)
			.list(&ListParams::default())
			.await?
			.items)
	}

	async fn get_job(&self, namespace: &str, name: &str) -> AgentResult<Job> {
		self
			.namespaced::<Job>(namespace)
			.get(name)
			.await
			.map_err(|e| AgentError::from_kube(e, "job", name))
	}

	async fn list_jobs(&self, namespace: Option<&str>, label_selector: &str) -> AgentResult<Vec<Job>> {
		let lp = ListParams::default().labels(label_selector);
		Ok(self.scoped::<Job>(namespace).list(&lp).await?.items)
	}

	async fn list_services(
		&self,
		namespace: Option<&str>,
		label_selector: &str,
	) -> AgentResult<Vec<Service>> {
		let lp = ListParams::default().labels(label_selector);
		Ok(self.scoped::<Service>(namespace).list(&lp).await?.items)
	}

	#[instrument(skip(self))]
	async fn proxy_get(&self, path_and_query: &str) -> AgentResult<Bytes> {
		let request = http::Request::get(path_and_query)
			.body(Body::empty())
			.map_err(|e| AgentError::InvalidInput(format!("invalid proxy path: {e}")))?;
		let response = self.client.send(request).await?;
		let status = response.status();
		let body = response.into_body().collect_bytes().await?;
		if status.is_client_error() || status.is_server_error() {
			return Err(kube::Error::Api(ErrorResponse {
				status: status.to_string(),
				message: String::from_utf8_lossy(&body).into_owned(),
				reason: "proxied request failed".to_string(),
				code: status.as_u16(),
			})
			.into());
		}
		debug!(bytes = body.len(), "proxy response received");
		Ok(body)
	}

	#[instrument(skip(self))]
	async fn exec(
		&self,
		namespace: &str,
		pod: &str,
		container: &str,
		command: &[String],
	) -> AgentResult<ExecOutcome> {
		let pods = self.namespaced::<Pod>(namespace);
		let ap = AttachParams::default()
			.container(container)
			.stdout(false)
			.stderr(true);

		let mut attached = pods
			.exec(pod, command.to_vec(), &ap)
			.await
			.map_err(|e| AgentError::from_kube(e, "pod", pod))?;

		let mut stderr = String::new();
		if let Some(mut reader) = attached.stderr() {
			// Output is diagnostic only; a read failure must not mask the status.
			let _ = reader.read_to_string(&mut stderr).await;
		}

		let status = match attached.take_status() {
			Some(status) => status.await,
			None => None,
		};
		let _ = attached.join().await;

		let outcome = match status {
			Some(status) if status.status.as_deref() == Some("Failure") => {
				let message = status
					.message
					.filter(|m| !m.is_empty())
					.unwrap_or_else(|| stderr.trim().to_string());
				ExecOutcome::failure(message)
			}
			_ => ExecOutcome::success(),
		};
		debug!(success = outcome.success, "exec finished");
		Ok(outcome)
	}

	async fn stream_logs(
		&self,
		namespace: &str,
		pod: &str,
		opts: LogOptions,
	) -> AgentResult<LogStream> {
		let pods = self.namespaced::<Pod>(namespace);
		let lp = LogParams {
			container: opts.container,
			follow: opts.follow,
			tail_lines: opts.tail_lines,
			timestamps: opts.timestamps,
			..Default::default()
		};

		let stream = pods
			.log_stream(pod, &lp)
			.await
			.map_err(|e| AgentError::from_kube(e, "pod", pod))?;

		let bytes_stream = tokio_util::io::ReaderStream::new(stream.compat());
		Ok(Box::pin(bytes_stream))
	}

	async fn watch_controllers(
		&self,
		namespace: &str,
		kind: ControllerKind,
	) -> AgentResult<ControllerEventStream> {
		debug!(namespace, kind = %kind, "opening controller watch");
		let stream = match kind {
			ControllerKind::Deployment => {
				controller_events(self.namespaced::<Deployment>(namespace), ControllerObject::Deployment)
			}
			ControllerKind::StatefulSet => controller_events(
				self.namespaced::<StatefulSet>(namespace),
				ControllerObject::StatefulSet,
			),
			ControllerKind::ReplicaSet => {
				controller_events(self.namespaced::<ReplicaSet>(namespace), ControllerObject::ReplicaSet)
			}
			ControllerKind::DaemonSet => {
				controller_events(self.namespaced::<DaemonSet>(namespace), ControllerObject::DaemonSet)
			}
			ControllerKind::Job => {
				controller_events(self.namespaced::<Job>(namespace), ControllerObject::Job)
			}
		};
		Ok(stream)
	}
}

#[cfg(test)]
mod tests {
	use tokio::io::AsyncWriteExt;

	use super::*;

	/// Answer one request with `status` and a raw `body`, returning the base URL.
	async fn serve_once(status: &'static str, body: &'static [u8]) -> http::Uri {
		let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		tokio::spawn(async move {
			let (mut socket, _) = listener.accept().await.unwrap();
			let mut request = Vec::new();
			let mut buf = [0u8; 4096];
			while !request.windows(4).any(|w| w == b"\r\n\r\n") {
				let n = socket.read(&mut buf).await.unwrap();
				if n == 0 {
					break;
				}
				request.extend_from_slice(&buf[..n]);
			}
			let head = format!(
				"HTTP/1.1 {status}\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
				body.len()
			);
			socket.write_all(head.as_bytes()).await.unwrap();
			socket.write_all(body).await.unwrap();
			socket.shutdown().await.unwrap();
		});
		format!("http://{addr}").parse().unwrap()
	}

	fn client_for(uri: http::Uri) -> KubeClusterClient {
		KubeClusterClient::new(Client::try_from(kube::Config::new(uri)).unwrap())
	}

	#[tokio::test]
	async fn proxy_get_returns_body_bytes_unchanged() {
		let body: &'static [u8] = &[0xff, 0x00, 0xfe, b'\n', 0x80];
		let client = client_for(serve_once("200 OK", body).await);

		let bytes = client
			.proxy_get("/api/v1/namespaces/monitoring/services/prometheus:9090/proxy/api/v1/query")
			.await
			.unwrap();

		assert_eq!(&bytes[..], body);
	}

	#[tokio::test]
	async fn proxy_get_maps_error_status() {
		let client = client_for(serve_once("503 Service Unavailable", b"no endpoints").await);

		let err = client
			.proxy_get("/api/v1/namespaces/x/services/y/proxy/")
			.await
			.unwrap_err();

		assert!(matches!(
			err,
			AgentError::UpstreamUnavailable { ref message } if message.contains("no endpoints")
		));
	}
}
