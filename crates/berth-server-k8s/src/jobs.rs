// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Job listing by release ownership and cooperative job shutdown.

use futures::future;
use tracing::{info, instrument, warn};

use crate::agent::Agent;
use crate::error::{AgentError, AgentResult};
use crate::ownership::{job_pods_selector, LabelSet, OwnershipSelector};
use crate::types::{Job, Pod};

fn sidecar_running(pod: &Pod, container: &str) -> bool {
	pod
		.status
		.as_ref()
		.and_then(|s| s.container_statuses.as_ref())
		.into_iter()
		.flatten()
		.any(|cs| {
			cs.name == container
				&& cs
					.state
					.as_ref()
					.is_some_and(|state| state.running.is_some())
		})
}

impl Agent {
	/// Jobs carrying every label in `labels`, across all namespaces when
	/// `namespace` is `None`.
	#[instrument(skip(self, labels))]
	pub async fn list_jobs(&self, namespace: Option<&str>, labels: &LabelSet) -> AgentResult<Vec<Job>> {
		let selector = labels.to_selector_string();
		self
			.bounded("list jobs", self.client().list_jobs(namespace, &selector))
			.await
	}

	/// Jobs belonging to a release.
	#[instrument(skip(self, selector), fields(chart = selector.chart(), release = selector.release()))]
	pub async fn list_jobs_by_owner(
		&self,
		namespace: Option<&str>,
		selector: &OwnershipSelector,
	) -> AgentResult<Vec<Job>> {
		self.list_jobs(namespace, &selector.label_set()).await
	}

	/// Pods created for a job.
	#[instrument(skip(self))]
	pub async fn get_job_pods(&self, namespace: &str, job: &str) -> AgentResult<Vec<Pod>> {
		let selector = job_pods_selector(job)?.to_selector_string();
		self
			.bounded(
				"list job pods",
				self.client().list_pods(Some(namespace), &selector),
			)
			.await
	}

	/// Ask a running job to stop by signalling its sidecar container.
	///
	/// The job object is never deleted. Fails with
	/// [`AgentError::SidecarUnreachable`] when no running pod has the
	/// sidecar, or when the signal is not acknowledged within the sidecar
	/// timeout; falling back to deletion is the caller's decision.
	#[instrument(skip(self))]
	pub async fn stop_job(&self, namespace: &str, job: &str) -> AgentResult<()> {
		self
			.bounded("get job", self.client().get_job(namespace, job))
			.await?;

		let container = self.config().sidecar_container.clone();
		let command = self.config().sidecar_stop_command.clone();
		let unreachable = |message: String| AgentError::SidecarUnreachable {
			namespace: namespace.to_string(),
			job: job.to_string(),
			message,
		};

		let pods = self.get_job_pods(namespace, job).await?;
		let targets: Vec<String> = pods
			.iter()
			.filter(|p| sidecar_running(p, &container))
			.filter_map(|p| p.metadata.name.clone())
			.collect();
		if targets.is_empty() {
			return Err(unreachable(format!(
				"no running pod with a '{container}' container"
			)));
		}

		let timeout = self.config().sidecar_timeout();
		let signals = targets.iter().map(|pod| {
			let signal = self.client().exec(namespace, pod, &container, &command);
			async move {
				match tokio::time::timeout(timeout, signal).await {
					Ok(Ok(outcome)) if outcome.success => Ok(()),
					Ok(Ok(outcome)) => Err(outcome
						.message
						.unwrap_or_else(|| format!("stop command failed in pod {pod}"))),
					Ok(Err(e)) => Err(e.to_string()),
					Err(_) => Err(format!(
						"no response from pod {pod} within {}s",
						timeout.as_secs()
					)),
				}
			}
		});
		let results = future::join_all(signals).await;

		let mut signalled = Vec::new();
		let mut failed = Vec::new();
		for (pod, result) in targets.iter().zip(results) {
			match result {
				Ok(()) => signalled.push(pod.as_str()),
				Err(reason) => {
					warn!(pod = %pod, reason = %reason, "sidecar signal failed");
					failed.push((pod.as_str(), reason));
				}
			}
		}
		if !failed.is_empty() {
			return Err(unreachable(partial_stop_message(&signalled, failed)));
		}

		info!(pods = targets.len(), "stop signal delivered to job sidecar");
		Ok(())
	}
}

/// Describe a stop that failed in some pods. A lone failing pod reports its
/// own reason; otherwise every pod is named with its outcome.
fn partial_stop_message(signalled: &[&str], failed: Vec<(&str, String)>) -> String {
	if signalled.is_empty() && failed.len() == 1 {
		return failed.into_iter().map(|(_, reason)| reason).collect();
	}
	let failures: Vec<String> = failed
		.into_iter()
		.map(|(pod, reason)| format!("{pod}: {reason}"))
		.collect();
	let delivered = if signalled.is_empty() {
		"none".to_string()
	} else {
		signalled.join(", ")
	};
	format!(
		"stop signal failed in {} pod(s) ({}); delivered to: {delivered}",
		failures.len(),
		failures.join("; ")
	)
}
