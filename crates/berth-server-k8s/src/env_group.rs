// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Linked environment bundles: a config map whose secret-backed entries
//! hold a placeholder, paired with a secret of the same name holding the
//! real values.
//!
//! Mutations write the secret first and the config map second. Kubernetes
//! has no cross-object transaction, so a config map failure after the
//! secret was written is reported as [`AgentError::ConsistencyViolation`]
//! with `secret_written: true` and cleanup is left to the caller.

use std::collections::{BTreeMap, BTreeSet};

use berth_common_secret::SecretString;
use k8s_openapi::ByteString;
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::agent::{ignore_not_found, Agent};
use crate::error::{AgentError, AgentResult, BundlePhase};
use crate::types::{ConfigMap, ObjectMeta, Secret};

/// Prefix of the config map value standing in for a secret-backed entry.
pub const SECRET_PLACEHOLDER_PREFIX: &str = "PORTERSECRET_";

/// Label marking config maps and secrets that form a linked bundle.
pub const LINKED_BUNDLE_LABEL: &str = "berth.dev/linked-bundle";

/// Placeholder written into the config map for every secret-backed key.
pub fn secret_placeholder(bundle: &str) -> String {
	format!("{SECRET_PLACEHOLDER_PREFIX}{bundle}")
}

fn is_placeholder(value: &str) -> bool {
	value.starts_with(SECRET_PLACEHOLDER_PREFIX)
}

/// Desired contents of a bundle.
#[derive(Debug, Clone, Default)]
pub struct BundleSpec {
	pub name: String,
	pub namespace: String,
	pub plain: BTreeMap<String, String>,
	/// Secret-backed entries. On update an empty value keeps whatever the
	/// key currently holds.
	pub secrets: BTreeMap<String, SecretString>,
}

impl BundleSpec {
	fn validate(&self) -> AgentResult<()> {
		if self.name.is_empty() || self.namespace.is_empty() {
			return Err(AgentError::InvalidInput(
				"bundle name and namespace are required".to_string(),
			));
		}
		if let Some(key) = self.plain.keys().find(|k| self.secrets.contains_key(*k)) {
			return Err(AgentError::InvalidInput(format!(
				"key '{key}' is both a plain and a secret entry"
			)));
		}
		Ok(())
	}
}

/// A bundle as read back from the cluster. Secret values are never returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkedEnvironmentBundle {
	pub name: String,
	pub namespace: String,
	pub plain: BTreeMap<String, String>,
	pub secret_keys: BTreeSet<String>,
}

impl LinkedEnvironmentBundle {
	fn from_config_map(cm: &ConfigMap) -> Self {
		let mut plain = BTreeMap::new();
		let mut secret_keys = BTreeSet::new();
		for (key, value) in cm.data.iter().flatten() {
			if is_placeholder(value) {
				secret_keys.insert(key.clone());
			} else {
				plain.insert(key.clone(), value.clone());
			}
		}
		Self {
			name: cm.metadata.name.clone().unwrap_or_default(),
			namespace: cm.metadata.namespace.clone().unwrap_or_default(),
			plain,
			secret_keys,
		}
	}
}

fn bundle_meta(name: &str, namespace: &str) -> ObjectMeta {
	ObjectMeta {
		name: Some(name.to_string()),
		namespace: Some(namespace.to_string()),
		labels: Some(BTreeMap::from([(
			LINKED_BUNDLE_LABEL.to_string(),
			"true".to_string(),
		)])),
		..Default::default()
	}
}

fn secret_bytes(value: &SecretString) -> ByteString {
	ByteString(value.expose().as_bytes().to_vec())
}

impl Agent {
	/// Create a linked bundle: secret first, then the config map.
	#[instrument(skip(self, spec), fields(name = %spec.name, namespace = %spec.namespace))]
	pub async fn create_linked_bundle(&self, spec: BundleSpec) -> AgentResult<LinkedEnvironmentBundle> {
		spec.validate()?;

		let secret = Secret {
			metadata: bundle_meta(&spec.name, &spec.namespace),
			type_: Some("Opaque".to_string()),
			data: Some(
				spec
					.secrets
					.iter()
					.map(|(k, v)| (k.clone(), secret_bytes(v)))
					.collect(),
			),
			..Default::default()
		};
		self
			.bounded(
				"create secret",
				self.client().create_secret(&spec.namespace, secret),
			)
			.await?;

		let placeholder = secret_placeholder(&spec.name);
		let mut data = spec.plain.clone();
		for key in spec.secrets.keys() {
			data.insert(key.clone(), placeholder.clone());
		}
		let cm = ConfigMap {
			metadata: bundle_meta(&spec.name, &spec.namespace),
			data: Some(data),
			..Default::default()
		};

		let created = self
			.bounded(
				"create configmap",
				self.client().create_config_map(&spec.namespace, cm),
			)
			.await
			.map_err(|e| config_map_failed(&spec, e))?;

		info!(secret_keys = spec.secrets.len(), "linked bundle created");
		Ok(LinkedEnvironmentBundle::from_config_map(&created))
	}

	/// Replace a bundle's contents.
	///
	/// Keys absent from `spec` are removed from both objects. For a secret
	/// entry with an empty value: a key the config map never held is written
	/// as an empty plain value; a key that already exists keeps its current
	/// value, so an existing placeholder is never reverted.
	#[instrument(skip(self, spec), fields(name = %spec.name, namespace = %spec.namespace))]
	pub async fn update_linked_bundle(&self, spec: BundleSpec) -> AgentResult<LinkedEnvironmentBundle> {
		spec.validate()?;

		let mut cm = self.get_config_map(&spec.namespace, &spec.name).await?;
		let existing_secret = match self
			.bounded(
				"get secret",
				self.client().get_secret(&spec.namespace, &spec.name),
			)
			.await
		{
			Ok(secret) => Some(secret),
			Err(e) if e.is_not_found() => None,
			Err(e) => return Err(e),
		};

		let old_data = cm.data.clone().unwrap_or_default();
		let old_secret_data = existing_secret
			.as_ref()
			.and_then(|s| s.data.clone())
			.unwrap_or_default();
		let placeholder = secret_placeholder(&spec.name);

		let mut data = spec.plain.clone();
		let mut secret_data = BTreeMap::new();
		for (key, value) in &spec.secrets {
			if !value.is_empty() {
				data.insert(key.clone(), placeholder.clone());
				secret_data.insert(key.clone(), secret_bytes(value));
				continue;
			}
			match old_data.get(key) {
				None => {
					data.insert(key.clone(), String::new());
				}
				Some(old) if is_placeholder(old) => {
					let kept = old_secret_data.get(key).cloned().ok_or_else(|| {
						AgentError::ConsistencyViolation {
							name: spec.name.clone(),
							namespace: spec.namespace.clone(),
							phase: BundlePhase::Verify,
							secret_written: false,
							detail: format!("placeholder for '{key}' has no secret value to keep"),
						}
					})?;
					data.insert(key.clone(), old.clone());
					secret_data.insert(key.clone(), kept);
				}
				Some(old) => {
					data.insert(key.clone(), old.clone());
				}
			}
		}

		let secret_meta = bundle_meta(&spec.name, &spec.namespace);
		let written = match existing_secret {
			Some(mut secret) => {
				secret.data = Some(secret_data);
				secret.string_data = None;
				self
					.bounded(
						"replace secret",
						self.client().replace_secret(&spec.namespace, secret),
					)
					.await
			}
			None => {
				let secret = Secret {
					metadata: secret_meta,
					type_: Some("Opaque".to_string()),
					data: Some(secret_data),
					..Default::default()
				};
				self
					.bounded(
						"create secret",
						self.client().create_secret(&spec.namespace, secret),
					)
					.await
			}
		};
		written?;

		cm.data = Some(data);
		let updated = self
			.bounded(
				"replace configmap",
				self.client().replace_config_map(&spec.namespace, cm),
			)
			.await
			.map_err(|e| config_map_failed(&spec, e))?;

		info!("linked bundle updated");
		Ok(LinkedEnvironmentBundle::from_config_map(&updated))
	}

	/// Delete the secret, then the config map. Absent objects are skipped.
	#[instrument(skip(self))]
	pub async fn delete_linked_bundle(&self, namespace: &str, name: &str) -> AgentResult<()> {
		ignore_not_found(
			self
				.bounded("delete secret", self.client().delete_secret(namespace, name))
				.await,
		)?;

		ignore_not_found(
			self
				.bounded(
					"delete configmap",
					self.client().delete_config_map(namespace, name),
				)
				.await,
		)
		.map_err(|e| {
			error!(error = %e, "secret deleted but config map delete failed");
			AgentError::ConsistencyViolation {
				name: name.to_string(),
				namespace: namespace.to_string(),
				phase: BundlePhase::ConfigMap,
				secret_written: false,
				detail: format!("secret deleted but config map remains: {e}"),
			}
		})?;

		info!("linked bundle deleted");
		Ok(())
	}

	#[instrument(skip(self))]
	pub async fn get_linked_bundle(
		&self,
		namespace: &str,
		name: &str,
	) -> AgentResult<LinkedEnvironmentBundle> {
		let cm = self.get_config_map(namespace, name).await?;
		Ok(LinkedEnvironmentBundle::from_config_map(&cm))
	}

	/// Bundles in a namespace, read from config maps only.
	#[instrument(skip(self))]
	pub async fn list_linked_bundles(
		&self,
		namespace: &str,
	) -> AgentResult<Vec<LinkedEnvironmentBundle>> {
		let selector = format!("{LINKED_BUNDLE_LABEL}=true");
		let maps = self
			.bounded(
				"list configmaps",
				self.client().list_config_maps(namespace, Some(&selector)),
			)
			.await?;
		Ok(maps.iter().map(LinkedEnvironmentBundle::from_config_map).collect())
	}

	/// Check that every placeholder has a secret key and every secret key has
	/// a placeholder.
	#[instrument(skip(self))]
	pub async fn verify_linked_bundle(
		&self,
		namespace: &str,
		name: &str,
	) -> AgentResult<LinkedEnvironmentBundle> {
		let cm = self.get_config_map(namespace, name).await?;
		let secret_keys: BTreeSet<String> = match self
			.bounded("get secret", self.client().get_secret(namespace, name))
			.await
		{
			Ok(secret) => secret.data.unwrap_or_default().into_keys().collect(),
			Err(e) if e.is_not_found() => BTreeSet::new(),
			Err(e) => return Err(e),
		};

		let expected = secret_placeholder(name);
		let data = cm.data.clone().unwrap_or_default();
		let dangling: Vec<&str> = data
			.iter()
			.filter(|(k, v)| is_placeholder(v) && (**v != expected || !secret_keys.contains(*k)))
			.map(|(k, _)| k.as_str())
			.collect();
		let orphaned: Vec<&str> = secret_keys
			.iter()
			.filter(|k| data.get(*k) != Some(&expected))
			.map(String::as_str)
			.collect();

		if !dangling.is_empty() || !orphaned.is_empty() {
			warn!(?dangling, ?orphaned, "linked bundle is inconsistent");
			return Err(AgentError::ConsistencyViolation {
				name: name.to_string(),
				namespace: namespace.to_string(),
				phase: BundlePhase::Verify,
				secret_written: !secret_keys.is_empty(),
				detail: format!(
					"dangling placeholders: [{}]; orphaned secret keys: [{}]",
					dangling.join(", "),
					orphaned.join(", ")
				),
			});
		}

		Ok(LinkedEnvironmentBundle::from_config_map(&cm))
	}
}

fn config_map_failed(spec: &BundleSpec, err: AgentError) -> AgentError {
	error!(error = %err, "config map write failed after secret was written");
	AgentError::ConsistencyViolation {
		name: spec.name.clone(),
		namespace: spec.namespace.clone(),
		phase: BundlePhase::ConfigMap,
		secret_written: true,
		detail: err.to_string(),
	}
}
