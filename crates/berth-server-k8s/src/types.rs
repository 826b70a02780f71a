// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::fmt;
use std::pin::Pin;
use std::str::FromStr;

use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, AgentResult};

pub use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
pub use k8s_openapi::api::batch::v1::Job;
pub use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Pod, Secret, Service};
pub use k8s_openapi::api::networking::v1::Ingress;
pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Options for log streaming.
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
	/// Container to read; the pod's only container when unset.
	pub container: Option<String>,
	pub tail_lines: Option<i64>,
	pub timestamps: bool,
	pub follow: bool,
}

/// A pinned stream of raw log bytes from a container.
pub type LogStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// A pinned stream of controller watch events.
pub type ControllerEventStream = Pin<Box<dyn Stream<Item = AgentResult<ControllerEvent>> + Send>>;

/// Workload controllers whose rollout status can be streamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerKind {
	Deployment,
	StatefulSet,
	ReplicaSet,
	DaemonSet,
	Job,
}

impl ControllerKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			ControllerKind::Deployment => "deployment",
			ControllerKind::StatefulSet => "statefulset",
			ControllerKind::ReplicaSet => "replicaset",
			ControllerKind::DaemonSet => "daemonset",
			ControllerKind::Job => "job",
		}
	}
}

impl fmt::Display for ControllerKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for ControllerKind {
	type Err = AgentError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"deployment" => Ok(ControllerKind::Deployment),
			"statefulset" => Ok(ControllerKind::StatefulSet),
			"replicaset" => Ok(ControllerKind::ReplicaSet),
			"daemonset" => Ok(ControllerKind::DaemonSet),
			"job" => Ok(ControllerKind::Job),
			other => Err(AgentError::InvalidInput(format!(
				"unsupported controller kind '{other}'"
			))),
		}
	}
}

/// A typed controller object as delivered by a watch.
#[derive(Debug, Clone)]
pub enum ControllerObject {
	Deployment(Deployment),
	StatefulSet(StatefulSet),
	ReplicaSet(ReplicaSet),
	DaemonSet(DaemonSet),
	Job(Job),
}

impl ControllerObject {
	pub fn kind(&self) -> ControllerKind {
		match self {
			ControllerObject::Deployment(_) => ControllerKind::Deployment,
			ControllerObject::StatefulSet(_) => ControllerKind::StatefulSet,
			ControllerObject::ReplicaSet(_) => ControllerKind::ReplicaSet,
			ControllerObject::DaemonSet(_) => ControllerKind::DaemonSet,
			ControllerObject::Job(_) => ControllerKind::Job,
		}
	}

	pub fn metadata(&self) -> &ObjectMeta {
		match self {
			ControllerObject::Deployment(o) => &o.metadata,
			ControllerObject::StatefulSet(o) => &o.metadata,
			ControllerObject::ReplicaSet(o) => &o.metadata,
			ControllerObject::DaemonSet(o) => &o.metadata,
			ControllerObject::Job(o) => &o.metadata,
		}
	}
}

/// A discrete watch transition for one controller.
#[derive(Debug, Clone)]
pub enum ControllerEvent {
	/// The object was listed initially, created, or changed.
	Applied(ControllerObject),
	Deleted(ControllerObject),
}

impl ControllerEvent {
	pub fn object(&self) -> &ControllerObject {
		match self {
			ControllerEvent::Applied(o) | ControllerEvent::Deleted(o) => o,
		}
	}
}

/// Result of running a command in a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutcome {
	pub success: bool,
	/// Failure message from the exec status, or captured stderr.
	pub message: Option<String>,
}

impl ExecOutcome {
	pub fn success() -> Self {
		Self {
			success: true,
			message: None,
		}
	}

	pub fn failure(message: impl Into<String>) -> Self {
		Self {
			success: false,
			message: Some(message.into()),
		}
	}
}

/// Namespace/name pair for resources returned in summary form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
	pub name: String,
	pub namespace: String,
}

impl ResourceRef {
	pub(crate) fn from_meta(meta: &ObjectMeta) -> Self {
		Self {
			name: meta.name.clone().unwrap_or_default(),
			namespace: meta.namespace.clone().unwrap_or_default(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn controller_kind_parses_lowercase_names() {
		for kind in [
			ControllerKind::Deployment,
			ControllerKind::StatefulSet,
			ControllerKind::ReplicaSet,
			ControllerKind::DaemonSet,
			ControllerKind::Job,
		] {
			assert_eq!(kind.as_str().parse::<ControllerKind>().unwrap(), kind);
		}
		assert_eq!(
			"Deployment".parse::<ControllerKind>().unwrap(),
			ControllerKind::Deployment
		);
	}

	#[test]
	fn unknown_controller_kind_is_invalid_input() {
		let err = "cronjob".parse::<ControllerKind>().unwrap_err();
		assert!(matches!(err, AgentError::InvalidInput(_)));
	}
}
