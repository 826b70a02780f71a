// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! In-memory doubles for the cluster, the OAuth provider and the stream
//! client. Used by this crate's tests and by the fixture agent factory.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::{stream, Stream, StreamExt};
use k8s_openapi::api::core::v1::{
	ContainerState, ContainerStateRunning, ContainerStatus, PodStatus, ServicePort, ServiceSpec,
};
use kube::core::ErrorResponse;

use berth_common_secret::SecretString;

use crate::client::ClusterClient;
use crate::credential::{ClusterCredential, RefreshedToken};
use crate::error::{AgentError, AgentResult, CloseReason};
use crate::oauth::{RefreshError, TokenRefresher};
use crate::streaming::{Downstream, Frame};
use crate::types::{
	ConfigMap, ControllerEvent, ControllerEventStream, ControllerKind, ExecOutcome, Ingress, Job,
	LogOptions, LogStream, Namespace, ObjectMeta, Pod, Secret, Service,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cluster calls that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
	ListNamespaces,
	GetConfigMap,
	ListConfigMaps,
	CreateConfigMap,
	ReplaceConfigMap,
	DeleteConfigMap,
	GetSecret,
	CreateSecret,
	ReplaceSecret,
	DeleteSecret,
	ListPods,
	DeletePod,
	GetIngress,
	ListIngresses,
	GetJob,
	ListJobs,
	ListServices,
	ProxyGet,
	Exec,
	StreamLogs,
	WatchControllers,
}

/// How the fake sidecar answers an exec.
#[derive(Debug, Clone, Default)]
pub enum ExecBehavior {
	#[default]
	Succeed,
	Fail(String),
	/// Never answer.
	Hang,
}

/// What a scripted log or watch source does after its scripted items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SourceEnd {
	#[default]
	Close,
	/// Stay open without producing anything.
	Hang,
	Fail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecCall {
	pub namespace: String,
	pub pod: String,
	pub container: String,
	pub command: Vec<String>,
}

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
	(namespace.to_string(), name.to_string())
}

fn meta_key(meta: &ObjectMeta, namespace: &str) -> Key {
	key(namespace, meta.name.as_deref().unwrap_or_default())
}

#[derive(Default)]
struct State {
	namespaces: Vec<Namespace>,
	config_maps: BTreeMap<Key, ConfigMap>,
	secrets: BTreeMap<Key, Secret>,
	pods: BTreeMap<Key, Pod>,
	jobs: BTreeMap<Key, Job>,
	ingresses: BTreeMap<Key, Ingress>,
	services: BTreeMap<Key, Service>,
	failures: HashMap<Operation, u16>,
	latency: Option<Duration>,
	exec_behavior: ExecBehavior,
	pod_exec_behavior: HashMap<String, ExecBehavior>,
	exec_calls: Vec<ExecCall>,
	deletions: Vec<String>,
	proxy_response: Bytes,
	proxy_paths: Vec<String>,
	log_chunks: Vec<Bytes>,
	log_end: SourceEnd,
	watch_events: Vec<ControllerEvent>,
	watch_end: SourceEnd,
}

/// Drops decrement the open-handle count of the source that created it.
struct HandleGuard(Arc<AtomicUsize>);

impl HandleGuard {
	fn open(counter: &Arc<AtomicUsize>) -> Self {
		counter.fetch_add(1, Ordering::SeqCst);
		Self(counter.clone())
	}
}

impl Drop for HandleGuard {
	fn drop(&mut self) {
		self.0.fetch_sub(1, Ordering::SeqCst);
	}
}

/// An in-memory cluster implementing [`ClusterClient`].
///
/// Clones share state, so a test keeps one handle for inspection while the
/// agent owns another.
#[derive(Clone, Default)]
pub struct FakeCluster {
	state: Arc<Mutex<State>>,
	open_handles: Arc<AtomicUsize>,
	consumed: Arc<AtomicUsize>,
}

fn matches_selector(labels: Option<&BTreeMap<String, String>>, selector: &str) -> bool {
	let empty = BTreeMap::new();
	let labels = labels.unwrap_or(&empty);
	selector
		.split(',')
		.filter(|term| !term.is_empty())
		.all(|term| match term.split_once('=') {
			Some((k, v)) => labels.get(k).map(String::as_str) == Some(v),
			None => labels.contains_key(term),
		})
}

fn in_namespace(k: &Key, namespace: Option<&str>) -> bool {
	namespace.map_or(true, |ns| k.0 == ns)
}

fn api_error(code: u16, message: impl Into<String>) -> AgentError {
	AgentError::from(kube::Error::Api(ErrorResponse {
		status: "Failure".to_string(),
		message: message.into(),
		reason: String::new(),
		code,
	}))
}

impl FakeCluster {
	pub fn new() -> Self {
		Self::default()
	}

	fn state(&self) -> MutexGuard<'_, State> {
		lock(&self.state)
	}

	/// Apply configured latency and failure for an operation.
	async fn enter(&self, op: Operation) -> AgentResult<()> {
		let (latency, failure) = {
			let state = self.state();
			(state.latency, state.failures.get(&op).copied())
		};
		if let Some(latency) = latency {
			tokio::time::sleep(latency).await;
		}
		match failure {
			Some(code) => Err(api_error(code, format!("injected failure for {op:?}"))),
			None => Ok(()),
		}
	}

	pub fn add_namespace(&self, name: &str) {
		self.state().namespaces.push(Namespace {
			metadata: ObjectMeta {
				name: Some(name.to_string()),
				..Default::default()
			},
			..Default::default()
		});
	}

	pub fn add_pod(&self, pod: Pod) {
		let ns = pod.metadata.namespace.clone().unwrap_or_default();
		self.state().pods.insert(meta_key(&pod.metadata, &ns), pod);
	}

	pub fn add_job(&self, job: Job) {
		let ns = job.metadata.namespace.clone().unwrap_or_default();
		self.state().jobs.insert(meta_key(&job.metadata, &ns), job);
	}

	pub fn add_service(&self, service: Service) {
		let ns = service.metadata.namespace.clone().unwrap_or_default();
		self
			.state()
			.services
			.insert(meta_key(&service.metadata, &ns), service);
	}

	pub fn add_ingress(&self, ingress: Ingress) {
		let ns = ingress.metadata.namespace.clone().unwrap_or_default();
		self
			.state()
			.ingresses
			.insert(meta_key(&ingress.metadata, &ns), ingress);
	}

	/// Make every call of `op` fail with the given API status code.
	pub fn fail_on(&self, op: Operation, code: u16) {
		self.state().failures.insert(op, code);
	}

	pub fn clear_failures(&self) {
		self.state().failures.clear();
	}

	/// Delay every call by `latency` before answering.
	pub fn set_latency(&self, latency: Duration) {
		self.state().latency = Some(latency);
	}

	pub fn set_exec_behavior(&self, behavior: ExecBehavior) {
		self.state().exec_behavior = behavior;
	}

	/// Override the exec behavior for one pod.
	pub fn set_pod_exec_behavior(&self, pod: &str, behavior: ExecBehavior) {
		self.state().pod_exec_behavior.insert(pod.to_string(), behavior);
	}

	pub fn set_proxy_response(&self, body: Bytes) {
		self.state().proxy_response = body;
	}

	pub fn script_logs(&self, chunks: Vec<Bytes>, end: SourceEnd) {
		let mut state = self.state();
		state.log_chunks = chunks;
		state.log_end = end;
	}

	pub fn script_watch(&self, events: Vec<ControllerEvent>, end: SourceEnd) {
		let mut state = self.state();
		state.watch_events = events;
		state.watch_end = end;
	}

	/// Directly edit a stored config map's data, bypassing the agent.
	pub fn edit_config_map(
		&self,
		namespace: &str,
		name: &str,
		edit: impl FnOnce(&mut BTreeMap<String, String>),
	) {
		if let Some(cm) = self.state().config_maps.get_mut(&key(namespace, name)) {
			edit(cm.data.get_or_insert_with(BTreeMap::new));
		}
	}

	pub fn config_map(&self, namespace: &str, name: &str) -> Option<ConfigMap> {
		self.state().config_maps.get(&key(namespace, name)).cloned()
	}

	pub fn secret(&self, namespace: &str, name: &str) -> Option<Secret> {
		self.state().secrets.get(&key(namespace, name)).cloned()
	}

	pub fn job(&self, namespace: &str, name: &str) -> Option<Job> {
		self.state().jobs.get(&key(namespace, name)).cloned()
	}

	pub fn exec_calls(&self) -> Vec<ExecCall> {
		self.state().exec_calls.clone()
	}

	/// Every successful delete, as `kind/namespace/name`.
	pub fn deletions(&self) -> Vec<String> {
		self.state().deletions.clone()
	}

	pub fn proxy_paths(&self) -> Vec<String> {
		self.state().proxy_paths.clone()
	}

	/// Log and watch sources currently held open by a consumer.
	pub fn open_handles(&self) -> usize {
		self.open_handles.load(Ordering::SeqCst)
	}

	/// Items pulled from log and watch sources so far.
	pub fn consumed_items(&self) -> usize {
		self.consumed.load(Ordering::SeqCst)
	}

	/// Wrap a scripted source so that it tracks consumption and open handles.
	fn tracked<T, S>(&self, source: S) -> impl Stream<Item = T> + Send + 'static
	where
		T: Send + 'static,
		S: Stream<Item = T> + Send + 'static,
	{
		let guard = HandleGuard::open(&self.open_handles);
		let consumed = self.consumed.clone();
		source.map(move |item| {
			let _held = &guard;
			consumed.fetch_add(1, Ordering::SeqCst);
			item
		})
	}

	fn remove<T>(
		&self,
		kind: &str,
		pick: impl FnOnce(&mut State) -> &mut BTreeMap<Key, T>,
		namespace: &str,
		name: &str,
	) -> AgentResult<()> {
		let mut state = self.state();
		if pick(&mut state).remove(&key(namespace, name)).is_none() {
			return Err(api_error(404, format!("{kind} {name} not found")));
		}
		state.deletions.push(format!("{kind}/{namespace}/{name}"));
		Ok(())
	}
}

fn tail<T: Send + 'static>(end: SourceEnd, error: impl FnOnce() -> T) -> stream::BoxStream<'static, T> {
	match end {
		SourceEnd::Close => stream::empty().boxed(),
		SourceEnd::Hang => stream::pending().boxed(),
		SourceEnd::Fail => stream::once(futures::future::ready(error())).boxed(),
	}
}

#[async_trait]
impl ClusterClient for FakeCluster {
	async fn list_namespaces(&self) -> AgentResult<Vec<Namespace>> {
		self.enter(Operation::ListNamespaces).await?;
		Ok(self.state().namespaces.clone())
	}

	async fn get_config_map(&self, namespace: &str, name: &str) -> AgentResult<ConfigMap> {
		self.enter(Operation::GetConfigMap).await?;
		self
			.config_map(namespace, name)
			.ok_or_else(|| AgentError::not_found("configmap", name))
	}

	async fn list_config_maps(
		&self,
		namespace: &str,
		label_selector: Option<&str>,
	) -> AgentResult<Vec<ConfigMap>> {
		self.enter(Operation::ListConfigMaps).await?;
		let selector = label_selector.unwrap_or_default();
		Ok(self
			.state()
			.config_maps
			.iter()
			.filter(|(k, cm)| {
				in_namespace(k, Some(namespace)) && matches_selector(cm.metadata.labels.as_ref(), selector)
			})
			.map(|(_, cm)| cm.clone())
			.collect())
	}

	async fn create_config_map(&self, namespace: &str, mut cm: ConfigMap) -> AgentResult<ConfigMap> {
		self.enter(Operation::CreateConfigMap).await?;
		cm.metadata.namespace = Some(namespace.to_string());
		let k = meta_key(&cm.metadata, namespace);
		let mut state = self.state();
		if state.config_maps.contains_key(&k) {
			return Err(api_error(409, format!("configmap {} already exists", k.1)));
		}
		state.config_maps.insert(k, cm.clone());
		Ok(cm)
	}

	async fn replace_config_map(&self, namespace: &str, cm: ConfigMap) -> AgentResult<ConfigMap> {
		self.enter(Operation::ReplaceConfigMap).await?;
		let k = meta_key(&cm.metadata, namespace);
		let mut state = self.state();
		match state.config_maps.get_mut(&k) {
			Some(slot) => {
				*slot = cm.clone();
				Ok(cm)
			}
			None => Err(AgentError::not_found("configmap", k.1)),
		}
	}

	async fn delete_config_map(&self, namespace: &str, name: &str) -> AgentResult<()> {
		self.enter(Operation::DeleteConfigMap).await?;
		self.remove("configmap", |s| &mut s.config_maps, namespace, name)
	}

	async fn get_secret(&self, namespace: &str, name: &str) -> AgentResult<Secret> {
		self.enter(Operation::GetSecret).await?;
		self
			.secret(namespace, name)
			.ok_or_else(|| AgentError::not_found("secret", name))
	}

	async fn create_secret(&self, namespace: &str, mut secret: Secret) -> AgentResult<Secret> {
		self.enter(Operation::CreateSecret).await?;
		secret.metadata.namespace = Some(namespace.to_string());
		let k = meta_key(&secret.metadata, namespace);
		let mut state = self.state();
		if state.secrets.contains_key(&k) {
			return Err(api_error(409, format!("secret {} already exists", k.1)));
		}
		state.secrets.insert(k, secret.clone());
		Ok(secret)
	}

	async fn replace_secret(&self, namespace: &str, secret: Secret) -> AgentResult<Secret> {
		self.enter(Operation::ReplaceSecret).await?;
		let k = meta_key(&secret.metadata, namespace);
		let mut state = self.state();
		match state.secrets.get_mut(&k) {
			Some(slot) => {
				*slot = secret.clone();
				Ok(secret)
			}
			None => Err(AgentError::not_found("secret", k.1)),
		}
	}

	async fn delete_secret(&self, namespace: &str, name: &str) -> AgentResult<()> {
		self.enter(Operation::DeleteSecret).await?;
		self.remove("secret", |s| &mut s.secrets, namespace, name)
	}

	async fn list_pods(
		&self,
		namespace: Option<&str>,
		label_selector: &str,
	) -> AgentResult<Vec<Pod>> {
		self.enter(Operation::ListPods).await?;
		Ok(self
			.state()
			.pods
			.iter()
			.filter(|(k, p)| {
				in_namespace(k, namespace) && matches_selector(p.metadata.labels.as_ref(), label_selector)
			})
			.map(|(_, p)| p.clone())
			.collect())
	}

	async fn delete_pod(&self, namespace: &str, name: &str) -> AgentResult<()> {
		self.enter(Operation::DeletePod).await?;
		self.remove("pod", |s| &mut s.pods, namespace, name)
	}

	async fn get_ingress(&self, namespace: &str, name: &str) -> AgentResult<Ingress> {
		self.enter(Operation::GetIngress).await?;
		self
			.state()
			.ingresses
			.get(&key(namespace, name))
			.cloned()
			.ok_or_else(|| AgentError::not_found("ingress", name))
	}

	async fn list_ingresses(&self, namespace: Option<&str>) -> AgentResult<Vec<Ingress>> {
		self.enter(Operation::ListIngresses).await?;
		Ok(self
			.state()
			.ingresses
			.iter()
			.filter(|(k, _)| in_namespace(k, namespace))
			.map(|(_, i)| i.clone())
			.collect())
	}

	async fn get_job(&self, namespace: &str, name: &str) -> AgentResult<Job> {
		self.enter(Operation::GetJob).await?;
		self
			.job(namespace, name)
			.ok_or_else(|| AgentError::not_found("job", name))
	}

	async fn list_jobs(&self, namespace: Option<&str>, label_selector: &str) -> AgentResult<Vec<Job>> {
		self.enter(Operation::ListJobs).await?;
		Ok(self
			.state()
			.jobs
			.iter()
			.filter(|(k, j)| {
				in_namespace(k, namespace) && matches_selector(j.metadata.labels.as_ref(), label_selector)
			})
			.map(|(_, j)| j.clone())
			.collect())
	}

	async fn list_services(
		&self,
		namespace: Option<&str>,
		label_selector: &str,
	) -> AgentResult<Vec<Service>> {
		self.enter(Operation::ListServices).await?;
		Ok(self
			.state()
			.services
			.iter()
			.filter(|(k, s)| {
				in_namespace(k, namespace) && matches_selector(s.metadata.labels.as_ref(), label_selector)
			})
			.map(|(_, s)| s.clone())
			.collect())
	}

	async fn proxy_get(&self, path_and_query: &str) -> AgentResult<Bytes> {
		self.enter(Operation::ProxyGet).await?;
		let mut state = self.state();
		state.proxy_paths.push(path_and_query.to_string());
		Ok(state.proxy_response.clone())
	}

	async fn exec(
		&self,
		namespace: &str,
		pod: &str,
		container: &str,
		command: &[String],
	) -> AgentResult<ExecOutcome> {
		self.enter(Operation::Exec).await?;
		let behavior = {
			let mut state = self.state();
			state.exec_calls.push(ExecCall {
				namespace: namespace.to_string(),
				pod: pod.to_string(),
				container: container.to_string(),
				command: command.to_vec(),
			});
			state
				.pod_exec_behavior
				.get(pod)
				.unwrap_or(&state.exec_behavior)
				.clone()
		};
		match behavior {
			ExecBehavior::Succeed => Ok(ExecOutcome::success()),
			ExecBehavior::Fail(message) => Ok(ExecOutcome::failure(message)),
			ExecBehavior::Hang => futures::future::pending().await,
		}
	}

	async fn stream_logs(
		&self,
		_namespace: &str,
		_pod: &str,
		_opts: LogOptions,
	) -> AgentResult<LogStream> {
		self.enter(Operation::StreamLogs).await?;
		let (chunks, end) = {
			let state = self.state();
			(state.log_chunks.clone(), state.log_end)
		};
		let source = stream::iter(chunks.into_iter().map(Ok)).chain(tail(end, || {
			Err(std::io::Error::new(
				std::io::ErrorKind::ConnectionReset,
				"log connection reset",
			))
		}));
		Ok(Box::pin(self.tracked(source)))
	}

	async fn watch_controllers(
		&self,
		namespace: &str,
		kind: ControllerKind,
	) -> AgentResult<ControllerEventStream> {
		self.enter(Operation::WatchControllers).await?;
		let events: Vec<ControllerEvent> = {
			let state = self.state();
			state
				.watch_events
				.iter()
				.filter(|e| {
					e.object().kind() == kind
						&& e.object().metadata().namespace.as_deref() == Some(namespace)
				})
				.cloned()
				.collect()
		};
		let end = self.state().watch_end;
		let source = stream::iter(events.into_iter().map(Ok))
			.chain(tail(end, || Err(AgentError::upstream("watch connection reset"))));
		Ok(Box::pin(self.tracked(source)))
	}
}

/// A pod with labels and no containers.
pub fn pod(namespace: &str, name: &str, labels: &[(&str, &str)]) -> Pod {
	Pod {
		metadata: object_meta(namespace, name, labels),
		..Default::default()
	}
}

/// Mark a container of `pod` as running.
pub fn with_running_container(mut pod: Pod, container: &str) -> Pod {
	let status = pod.status.get_or_insert_with(PodStatus::default);
	status
		.container_statuses
		.get_or_insert_with(Vec::new)
		.push(ContainerStatus {
			name: container.to_string(),
			ready: true,
			state: Some(ContainerState {
				running: Some(ContainerStateRunning::default()),
				..Default::default()
			}),
			..Default::default()
		});
	pod
}

pub fn job(namespace: &str, name: &str, labels: &[(&str, &str)]) -> Job {
	Job {
		metadata: object_meta(namespace, name, labels),
		..Default::default()
	}
}

pub fn service(namespace: &str, name: &str, labels: &[(&str, &str)], port: i32) -> Service {
	Service {
		metadata: object_meta(namespace, name, labels),
		spec: Some(ServiceSpec {
			ports: Some(vec![ServicePort {
				port,
				..Default::default()
			}]),
			..Default::default()
		}),
		..Default::default()
	}
}

pub fn ingress(namespace: &str, name: &str, annotations: BTreeMap<String, String>) -> Ingress {
	let mut metadata = object_meta(namespace, name, &[]);
	metadata.annotations = Some(annotations);
	Ingress {
		metadata,
		..Default::default()
	}
}

fn object_meta(namespace: &str, name: &str, labels: &[(&str, &str)]) -> ObjectMeta {
	ObjectMeta {
		name: Some(name.to_string()),
		namespace: Some(namespace.to_string()),
		labels: Some(
			labels
				.iter()
				.map(|(k, v)| (k.to_string(), v.to_string()))
				.collect(),
		),
		..Default::default()
	}
}

/// A [`TokenRefresher`] answering from a queue of scripted results.
#[derive(Clone, Default)]
pub struct ScriptedTokenRefresher {
	responses: Arc<Mutex<VecDeque<Result<(String, chrono::Duration), String>>>>,
	calls: Arc<AtomicUsize>,
	delay: Arc<Mutex<Option<Duration>>>,
}

impl ScriptedTokenRefresher {
	pub fn new() -> Self {
		Self::default()
	}

	/// Next refresh returns `token`, expiring `expires_in` from now.
	pub fn push_success(&self, token: &str, expires_in: chrono::Duration) {
		lock(&self.responses).push_back(Ok((token.to_string(), expires_in)));
	}

	pub fn push_failure(&self, message: &str) {
		lock(&self.responses).push_back(Err(message.to_string()));
	}

	/// Hold every refresh for `delay` before answering.
	pub fn set_delay(&self, delay: Duration) {
		*lock(&self.delay) = Some(delay);
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl TokenRefresher for ScriptedTokenRefresher {
	async fn refresh(&self, _credential: &ClusterCredential) -> Result<RefreshedToken, RefreshError> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		let delay = *lock(&self.delay);
		if let Some(delay) = delay {
			tokio::time::sleep(delay).await;
		}
		let next = lock(&self.responses).pop_front();
		match next {
			Some(Ok((token, expires_in))) => Ok(RefreshedToken {
				access_token: SecretString::from(token),
				refresh_token: None,
				expiry: Utc::now() + expires_in,
			}),
			Some(Err(message)) => Err(RefreshError::Provider(message)),
			None => Err(RefreshError::Provider("no scripted response".to_string())),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DownstreamMode {
	Record,
	FailAfter(usize),
	Stalled,
}

/// A [`Downstream`] that records frames and can simulate a vanished client.
#[derive(Clone)]
pub struct RecordingDownstream {
	frames: Arc<Mutex<Vec<Frame>>>,
	mode: DownstreamMode,
}

impl RecordingDownstream {
	pub fn new() -> Self {
		Self::with_mode(DownstreamMode::Record)
	}

	/// Accept `n` frames, then fail every write.
	pub fn failing_after(n: usize) -> Self {
		Self::with_mode(DownstreamMode::FailAfter(n))
	}

	/// Never complete a write.
	pub fn stalled() -> Self {
		Self::with_mode(DownstreamMode::Stalled)
	}

	fn with_mode(mode: DownstreamMode) -> Self {
		Self {
			frames: Arc::new(Mutex::new(Vec::new())),
			mode,
		}
	}

	pub fn frames(&self) -> Vec<Frame> {
		lock(&self.frames).clone()
	}
}

impl Default for RecordingDownstream {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl Downstream for RecordingDownstream {
	async fn send(&mut self, frame: Frame) -> AgentResult<()> {
		let recorded = lock(&self.frames).len();
		match self.mode {
			DownstreamMode::Stalled => futures::future::pending().await,
			DownstreamMode::FailAfter(n) if recorded >= n => {
				Err(AgentError::StreamTerminated(CloseReason::ClientDisconnected))
			}
			_ => {
				lock(&self.frames).push(frame);
				Ok(())
			}
		}
	}
}
