// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! In-cluster metrics: Prometheus discovery and range queries through the
//! API server's service proxy, plus NGINX ingress discovery.

use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::agent::Agent;
use crate::error::{AgentError, AgentResult};
use crate::ownership::{Label, LabelSet};
use crate::types::{ResourceRef, Service};

/// Ingress class annotation marking NGINX-served ingresses.
pub const INGRESS_CLASS_ANNOTATION: &str = "kubernetes.io/ingress.class";

const PROMETHEUS_APP: (&str, &str) = ("app", "prometheus");
const PROMETHEUS_COMPONENT: (&str, &str) = ("component", "server");
const DEFAULT_PROMETHEUS_PORT: i32 = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
	Cpu,
	Memory,
	Network,
}

impl fmt::Display for MetricKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			MetricKind::Cpu => f.write_str("cpu"),
			MetricKind::Memory => f.write_str("memory"),
			MetricKind::Network => f.write_str("network"),
		}
	}
}

/// Parameters of a pod metrics range query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsQuery {
	pub metric: MetricKind,
	pub namespace: String,
	pub pods: Vec<String>,
	/// Aggregate across pods instead of one series per pod.
	#[serde(default)]
	pub sum: bool,
	pub start: DateTime<Utc>,
	pub end: DateTime<Utc>,
	/// Resolution step in seconds.
	pub step_secs: u64,
}

/// Kubernetes object name rules: lowercase alphanumerics and '-', starting
/// and ending alphanumeric; '.' separates labels when `dotted`.
fn is_dns1123_name(name: &str, max_len: usize, dotted: bool) -> bool {
	let label_ok = |label: &str| {
		!label.is_empty()
			&& label
				.bytes()
				.all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
			&& !label.starts_with('-')
			&& !label.ends_with('-')
	};
	if name.is_empty() || name.len() > max_len {
		return false;
	}
	if dotted {
		name.split('.').all(label_ok)
	} else {
		label_ok(name)
	}
}

impl MetricsQuery {
	fn validate(&self) -> AgentResult<()> {
		if self.pods.is_empty() {
			return Err(AgentError::InvalidInput("at least one pod is required".to_string()));
		}
		if self.end <= self.start {
			return Err(AgentError::InvalidInput("end must be after start".to_string()));
		}
		if self.step_secs == 0 {
			return Err(AgentError::InvalidInput("step must be positive".to_string()));
		}
		if !is_dns1123_name(&self.namespace, 63, false) {
			return Err(AgentError::InvalidInput(format!(
				"invalid namespace '{}'",
				self.namespace
			)));
		}
		if let Some(pod) = self.pods.iter().find(|p| !is_dns1123_name(p, 253, true)) {
			return Err(AgentError::InvalidInput(format!("invalid pod name '{pod}'")));
		}
		Ok(())
	}

	/// PromQL expression for this query.
	pub fn promql(&self) -> String {
		let selector = format!(
			"namespace=\"{}\",pod=~\"{}\",container!=\"POD\",container!=\"\"",
			self.namespace,
			self
				.pods
				.iter()
				.map(|p| p.replace('.', "\\\\."))
				.collect::<Vec<_>>()
				.join("|")
		);
		let series = match self.metric {
			MetricKind::Cpu => format!("rate(container_cpu_usage_seconds_total{{{selector}}}[5m])"),
			MetricKind::Memory => format!("container_memory_usage_bytes{{{selector}}}"),
			MetricKind::Network => format!(
				"rate(container_network_receive_bytes_total{{namespace=\"{}\",pod=~\"{}\"}}[5m])",
				self.namespace,
				self.pods.join("|")
			),
		};
		if self.sum {
			format!("sum({series})")
		} else {
			format!("sum by (pod) ({series})")
		}
	}
}

/// Location of the discovered Prometheus server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsService {
	pub name: String,
	pub namespace: String,
	pub port: i32,
}

impl MetricsService {
	fn from_service(service: &Service) -> Self {
		let port = service
			.spec
			.as_ref()
			.and_then(|s| s.ports.as_ref())
			.and_then(|ports| ports.first())
			.map(|p| p.port)
			.unwrap_or(DEFAULT_PROMETHEUS_PORT);
		Self {
			name: service.metadata.name.clone().unwrap_or_default(),
			namespace: service.metadata.namespace.clone().unwrap_or_default(),
			port,
		}
	}

	fn proxy_path(&self, api_path: &str, query: &str) -> String {
		format!(
			"/api/v1/namespaces/{}/services/{}:{}/proxy{}?{}",
			self.namespace, self.name, self.port, api_path, query
		)
	}
}

fn prometheus_selector() -> AgentResult<LabelSet> {
	Ok(LabelSet::new()
		.with(Label::new(PROMETHEUS_APP.0, PROMETHEUS_APP.1)?)
		.with(Label::new(PROMETHEUS_COMPONENT.0, PROMETHEUS_COMPONENT.1)?))
}

impl Agent {
	/// Find the Prometheus server service, if one is installed.
	#[instrument(skip(self))]
	pub async fn detect_metrics_service(&self) -> AgentResult<Option<MetricsService>> {
		let selector = prometheus_selector()?.to_selector_string();
		let services = self
			.bounded("list services", self.client().list_services(None, &selector))
			.await?;
		let found = services.first().map(MetricsService::from_service);
		debug!(found = found.is_some(), "metrics service detection");
		Ok(found)
	}

	/// Run a range query and return Prometheus' response body verbatim.
	#[instrument(skip(self, query), fields(metric = %query.metric, namespace = %query.namespace))]
	pub async fn query_metrics(&self, query: &MetricsQuery) -> AgentResult<Bytes> {
		query.validate()?;
		let service = self
			.detect_metrics_service()
			.await?
			.ok_or_else(|| AgentError::not_found("metrics service", "prometheus"))?;

		let params = url::form_urlencoded::Serializer::new(String::new())
			.append_pair("query", &query.promql())
			.append_pair("start", &query.start.timestamp().to_string())
			.append_pair("end", &query.end.timestamp().to_string())
			.append_pair("step", &format!("{}s", query.step_secs))
			.finish();
		let path = service.proxy_path("/api/v1/query_range", &params);

		self
			.bounded("query metrics", self.client().proxy_get(&path))
			.await
	}

	/// Ingresses in any namespace annotated with the NGINX ingress class.
	#[instrument(skip(self))]
	pub async fn list_nginx_ingresses(&self) -> AgentResult<Vec<ResourceRef>> {
		let ingresses = self
			.bounded("list ingresses", self.client().list_ingresses(None))
			.await?;
		let mut refs: Vec<ResourceRef> = ingresses
			.iter()
			.filter(|ing| {
				ing
					.metadata
					.annotations
					.as_ref()
					.and_then(|a| a.get(INGRESS_CLASS_ANNOTATION))
					.is_some_and(|class| class == "nginx")
			})
			.map(|ing| ResourceRef::from_meta(&ing.metadata))
			.collect();
		refs.sort();
		Ok(refs)
	}
}
