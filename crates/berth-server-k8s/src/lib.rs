// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Per-request Kubernetes agent for Berth.
//!
//! This crate provides:
//! - Credential resolution with single-flight OAuth refresh
//! - A trait-based cluster client with a kube-backed implementation
//! - Linked secret/config-map environment bundles
//! - Release ownership queries, job shutdown and metrics proxying
//! - Cancellable log and controller status streams
//! - Temporary kubeconfig issuance

mod agent;
mod client;
mod credential;
mod env_group;
mod error;
mod factory;
mod jobs;
mod kube_client;
mod kubeconfig;
mod metrics;
mod oauth;
mod ownership;
mod resolver;
mod status;
mod streaming;
pub mod testing;
mod types;

pub use agent::Agent;
pub use client::ClusterClient;
pub use credential::{
	AuthKind, ClusterCredential, ClusterId, CredentialStore, InMemoryCredentialStore, ProjectId,
	RefreshedToken,
};
pub use env_group::{
	secret_placeholder, BundleSpec, LinkedEnvironmentBundle, LINKED_BUNDLE_LABEL,
	SECRET_PLACEHOLDER_PREFIX,
};
pub use error::{AgentError, AgentResult, BundlePhase, CloseReason};
pub use factory::{build_agent_factory, AgentFactory, FixtureAgentFactory, LiveAgentFactory};
pub use kube_client::KubeClusterClient;
pub use kubeconfig::{issue_temporary_credential, Kubeconfig, TemporaryCredentialDocument};
pub use metrics::{MetricKind, MetricsQuery, MetricsService, INGRESS_CLASS_ANNOTATION};
pub use oauth::{OAuthTokenRefresher, RefreshError, TokenRefresher};
pub use ownership::{
	job_pods_selector, Label, LabelSet, OwnershipSelector, CHART_LABEL, JOB_NAME_LABEL,
	RELEASE_LABEL,
};
pub use resolver::{CredentialResolver, ResolvedClientConfig};
pub use status::{ControllerStatus, RolloutPhase};
pub use streaming::{
	log_frames, status_frames, Downstream, Frame, SessionState, SinkDownstream, StreamSession,
	MAX_LOG_LINE_BYTES,
};
pub use types::{
	ConfigMap, ControllerEvent, ControllerEventStream, ControllerKind, ControllerObject, DaemonSet,
	Deployment, ExecOutcome, Ingress, Job, LogOptions, LogStream, Namespace, ObjectMeta, Pod,
	ReplicaSet, ResourceRef, Secret, Service, StatefulSet,
};
