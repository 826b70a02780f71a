// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Normalized rollout status for workload controllers.

use serde::Serialize;

use crate::types::{
	ControllerEvent, ControllerKind, ControllerObject, DaemonSet, Deployment, Job, ReplicaSet,
	StatefulSet,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RolloutPhase {
	Progressing,
	Healthy,
	Failed,
	Deleted,
}

/// One status record pushed to a controller-status stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControllerStatus {
	pub kind: ControllerKind,
	pub name: String,
	pub namespace: String,
	pub phase: RolloutPhase,
	pub desired: i32,
	pub ready: i32,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
}

impl ControllerStatus {
	pub fn from_event(event: &ControllerEvent) -> Self {
		let mut status = Self::from_object(event.object());
		if matches!(event, ControllerEvent::Deleted(_)) {
			status.phase = RolloutPhase::Deleted;
		}
		status
	}

	pub fn from_object(object: &ControllerObject) -> Self {
		let meta = object.metadata();
		let (phase, desired, ready, message) = match object {
			ControllerObject::Deployment(d) => deployment_status(d),
			ControllerObject::StatefulSet(s) => stateful_set_status(s),
			ControllerObject::ReplicaSet(r) => replica_set_status(r),
			ControllerObject::DaemonSet(d) => daemon_set_status(d),
			ControllerObject::Job(j) => job_status(j),
		};
		Self {
			kind: object.kind(),
			name: meta.name.clone().unwrap_or_default(),
			namespace: meta.namespace.clone().unwrap_or_default(),
			phase,
			desired,
			ready,
			message,
		}
	}
}

type Normalized = (RolloutPhase, i32, i32, Option<String>);

fn rollout_phase(desired: i32, ready: i32, updated: i32, stale_generation: bool) -> RolloutPhase {
	if !stale_generation && ready >= desired && updated >= desired {
		RolloutPhase::Healthy
	} else {
		RolloutPhase::Progressing
	}
}

fn stale(generation: Option<i64>, observed: Option<i64>) -> bool {
	match (generation, observed) {
		(Some(generation), Some(observed)) => observed < generation,
		(Some(_), None) => true,
		_ => false,
	}
}

fn deployment_status(d: &Deployment) -> Normalized {
	let desired = d.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
	let Some(status) = d.status.as_ref() else {
		return (RolloutPhase::Progressing, desired, 0, None);
	};

	let deadline_exceeded = status.conditions.iter().flatten().find(|c| {
		c.type_ == "Progressing" && c.reason.as_deref() == Some("ProgressDeadlineExceeded")
	});
	let ready = status.ready_replicas.unwrap_or(0);
	if let Some(condition) = deadline_exceeded {
		return (RolloutPhase::Failed, desired, ready, condition.message.clone());
	}

	let available = status.available_replicas.unwrap_or(0);
	let updated = status.updated_replicas.unwrap_or(0);
	// Old replica sets still hold pods while `replicas` exceeds `updated`.
	let old_pods_remaining = status.replicas.unwrap_or(0) > updated;
	let phase = if old_pods_remaining {
		RolloutPhase::Progressing
	} else {
		rollout_phase(
			desired,
			ready.min(available),
			updated,
			stale(d.metadata.generation, status.observed_generation),
		)
	};
	(phase, desired, ready, None)
}

fn stateful_set_status(s: &StatefulSet) -> Normalized {
	let desired = s.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
	let Some(status) = s.status.as_ref() else {
		return (RolloutPhase::Progressing, desired, 0, None);
	};
	let ready = status.ready_replicas.unwrap_or(0);
	let updated = status.updated_replicas.unwrap_or(0);
	let revision_pending = status.update_revision.is_some()
		&& status.current_revision != status.update_revision;
	let phase = if revision_pending {
		RolloutPhase::Progressing
	} else {
		rollout_phase(
			desired,
			ready,
			updated,
			stale(s.metadata.generation, status.observed_generation),
		)
	};
	(phase, desired, ready, None)
}

fn replica_set_status(r: &ReplicaSet) -> Normalized {
	let desired = r.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
	let Some(status) = r.status.as_ref() else {
		return (RolloutPhase::Progressing, desired, 0, None);
	};
	let ready = status.ready_replicas.unwrap_or(0);
	let failure = status
		.conditions
		.iter()
		.flatten()
		.find(|c| c.type_ == "ReplicaFailure" && c.status == "True");
	if let Some(condition) = failure {
		return (RolloutPhase::Failed, desired, ready, condition.message.clone());
	}
	let phase = rollout_phase(
		desired,
		ready,
		status.replicas,
		stale(r.metadata.generation, status.observed_generation),
	);
	(phase, desired, ready, None)
}

fn daemon_set_status(d: &DaemonSet) -> Normalized {
	let Some(status) = d.status.as_ref() else {
		return (RolloutPhase::Progressing, 0, 0, None);
	};
	let desired = status.desired_number_scheduled;
	let ready = status.number_ready;
	let available = status.number_available.unwrap_or(0);
	let updated = status.updated_number_scheduled.unwrap_or(0);
	let phase = rollout_phase(
		desired,
		ready.min(available),
		updated,
		stale(d.metadata.generation, status.observed_generation),
	);
	(phase, desired, ready, None)
}

fn job_status(j: &Job) -> Normalized {
	let desired = j.spec.as_ref().and_then(|s| s.completions).unwrap_or(1);
	let Some(status) = j.status.as_ref() else {
		return (RolloutPhase::Progressing, desired, 0, None);
	};
	let succeeded = status.succeeded.unwrap_or(0);
	let condition = |kind: &str| {
		status
			.conditions
			.iter()
			.flatten()
			.find(|c| c.type_ == kind && c.status == "True")
	};

	if let Some(failed) = condition("Failed") {
		let message = failed.message.clone().or_else(|| failed.reason.clone());
		return (RolloutPhase::Failed, desired, succeeded, message);
	}
	if condition("Complete").is_some() {
		return (RolloutPhase::Healthy, desired, succeeded, None);
	}
	(RolloutPhase::Progressing, desired, succeeded, None)
}

#[cfg(test)]
mod tests {
	use k8s_openapi::api::apps::v1::{DeploymentCondition, DeploymentSpec, DeploymentStatus};
	use k8s_openapi::api::batch::v1::{JobCondition, JobStatus};

	use super::*;
	use crate::types::ObjectMeta;

	fn deployment(replicas: i32, status: DeploymentStatus) -> Deployment {
		Deployment {
			metadata: ObjectMeta {
				name: Some("web".to_string()),
				namespace: Some("default".to_string()),
				generation: Some(2),
				..Default::default()
			},
			spec: Some(DeploymentSpec {
				replicas: Some(replicas),
				..Default::default()
			}),
			status: Some(status),
		}
	}

	#[test]
	fn deployment_fully_rolled_out_is_healthy() {
		let d = deployment(
			3,
			DeploymentStatus {
				observed_generation: Some(2),
				replicas: Some(3),
				updated_replicas: Some(3),
				ready_replicas: Some(3),
				available_replicas: Some(3),
				..Default::default()
			},
		);
		let status = ControllerStatus::from_object(&ControllerObject::Deployment(d));
		assert_eq!(status.phase, RolloutPhase::Healthy);
		assert_eq!((status.desired, status.ready), (3, 3));
		assert_eq!(status.name, "web");
	}

	#[test]
	fn deployment_with_old_pods_is_progressing() {
		let d = deployment(
			3,
			DeploymentStatus {
				observed_generation: Some(2),
				replicas: Some(4),
				updated_replicas: Some(3),
				ready_replicas: Some(3),
				available_replicas: Some(3),
				..Default::default()
			},
		);
		let status = ControllerStatus::from_object(&ControllerObject::Deployment(d));
		assert_eq!(status.phase, RolloutPhase::Progressing);
	}

	#[test]
	fn deployment_stale_generation_is_progressing() {
		let d = deployment(
			1,
			DeploymentStatus {
				observed_generation: Some(1),
				replicas: Some(1),
				updated_replicas: Some(1),
				ready_replicas: Some(1),
				available_replicas: Some(1),
				..Default::default()
			},
		);
		let status = ControllerStatus::from_object(&ControllerObject::Deployment(d));
		assert_eq!(status.phase, RolloutPhase::Progressing);
	}

	#[test]
	fn deployment_deadline_exceeded_is_failed() {
		let d = deployment(
			2,
			DeploymentStatus {
				conditions: Some(vec![DeploymentCondition {
					type_: "Progressing".to_string(),
					status: "False".to_string(),
					reason: Some("ProgressDeadlineExceeded".to_string()),
					message: Some("ReplicaSet \"web-5d\" has timed out progressing.".to_string()),
					..Default::default()
				}]),
				..Default::default()
			},
		);
		let status = ControllerStatus::from_object(&ControllerObject::Deployment(d));
		assert_eq!(status.phase, RolloutPhase::Failed);
		assert!(status.message.unwrap().contains("timed out"));
	}

	#[test]
	fn failed_job_reports_reason() {
		let job = Job {
			metadata: ObjectMeta {
				name: Some("migrate".to_string()),
				..Default::default()
			},
			status: Some(JobStatus {
				conditions: Some(vec![JobCondition {
					type_: "Failed".to_string(),
					status: "True".to_string(),
					reason: Some("BackoffLimitExceeded".to_string()),
					..Default::default()
				}]),
				..Default::default()
			}),
			..Default::default()
		};
		let status = ControllerStatus::from_object(&ControllerObject::Job(job));
		assert_eq!(status.phase, RolloutPhase::Failed);
		assert_eq!(status.message.as_deref(), Some("BackoffLimitExceeded"));
	}

	#[test]
	fn deleted_event_overrides_phase() {
		let job = Job::default();
		let status = ControllerStatus::from_event(&ControllerEvent::Deleted(ControllerObject::Job(job)));
		assert_eq!(status.phase, RolloutPhase::Deleted);
		assert_eq!(status.kind, ControllerKind::Job);
	}

	#[test]
	fn status_serializes_lowercase_phase() {
		let status = ControllerStatus::from_object(&ControllerObject::Job(Job::default()));
		let json = serde_json::to_value(&status).unwrap();
		assert_eq!(json["phase"], "progressing");
		assert_eq!(json["kind"], "job");
	}
}
