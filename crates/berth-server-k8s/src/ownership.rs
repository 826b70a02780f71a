// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Release ownership by label convention.
//!
//! Resources carry no structural reference to the release that installed
//! them; a release owns exactly the objects labelled with its chart and
//! release name. Renaming either label outside this module orphans those
//! objects from every query built here.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, AgentResult};

/// Label carrying the chart identity (`<chart>-<version>` or bare name).
pub const CHART_LABEL: &str = "helm.sh/chart";
/// Label carrying the release name.
pub const RELEASE_LABEL: &str = "meta.helm.sh/release-name";
/// Label the job controller puts on every pod it creates.
pub const JOB_NAME_LABEL: &str = "job-name";

const MAX_LABEL_VALUE_LEN: usize = 63;

/// A single `key=value` equality predicate.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Label {
	key: String,
	value: String,
}

impl Label {
	pub fn new(key: impl Into<String>, value: impl Into<String>) -> AgentResult<Self> {
		let key = key.into();
		let value = value.into();
		validate_key(&key)?;
		validate_value(&value)?;
		Ok(Self { key, value })
	}

	pub fn key(&self) -> &str {
		&self.key
	}

	pub fn value(&self) -> &str {
		&self.value
	}

	pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
		labels.get(&self.key) == Some(&self.value)
	}
}

impl fmt::Display for Label {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}={}", self.key, self.value)
	}
}

/// Conjunction of label predicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSet {
	labels: Vec<Label>,
}

impl LabelSet {
	pub fn new() -> Self {
		Self::default()
	}

	/// Add a predicate. A second predicate on the same key replaces the first.
	pub fn with(mut self, label: Label) -> Self {
		self.labels.retain(|l| l.key != label.key);
		self.labels.push(label);
		self.labels.sort();
		self
	}

	pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> AgentResult<Self>
	where
		K: Into<String>,
		V: Into<String>,
	{
		pairs
			.into_iter()
			.try_fold(LabelSet::new(), |set, (k, v)| Ok(set.with(Label::new(k, v)?)))
	}

	pub fn is_empty(&self) -> bool {
		self.labels.is_empty()
	}

	pub fn labels(&self) -> &[Label] {
		&self.labels
	}

	/// Selector string for the API server, e.g. `a=1,b=2`.
	pub fn to_selector_string(&self) -> String {
		self
			.labels
			.iter()
			.map(Label::to_string)
			.collect::<Vec<_>>()
			.join(",")
	}

	/// True when every predicate holds. The empty set matches everything.
	pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
		self.labels.iter().all(|l| l.matches(labels))
	}
}

/// The resource set belonging to one logical release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipSelector {
	chart: String,
	release: String,
}

impl OwnershipSelector {
	pub fn new(chart: impl Into<String>, release: impl Into<String>) -> AgentResult<Self> {
		let chart = chart.into();
		let release = release.into();
		if chart.is_empty() || release.is_empty() {
			return Err(AgentError::InvalidInput(
				"chart and release must both be set".to_string(),
			));
		}
		validate_value(&chart)?;
		validate_value(&release)?;
		Ok(Self { chart, release })
	}

	pub fn chart(&self) -> &str {
		&self.chart
	}

	pub fn release(&self) -> &str {
		&self.release
	}

	pub fn label_set(&self) -> LabelSet {
		LabelSet {
			labels: vec![
				Label {
					key: CHART_LABEL.to_string(),
					value: self.chart.clone(),
				},
				Label {
					key: RELEASE_LABEL.to_string(),
					value: self.release.clone(),
				},
			],
		}
	}

	pub fn to_selector_string(&self) -> String {
		self.label_set().to_selector_string()
	}

	pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
		self.label_set().matches(labels)
	}
}

/// Selector for the pods of one job.
pub fn job_pods_selector(job_name: &str) -> AgentResult<LabelSet> {
	Ok(LabelSet::new().with(Label::new(JOB_NAME_LABEL, job_name)?))
}

fn validate_key(key: &str) -> AgentResult<()> {
	let (prefix, name) = match key.rsplit_once('/') {
		Some((prefix, name)) => (Some(prefix), name),
		None => (None, key),
	};
	if let Some(prefix) = prefix {
		let valid_prefix = !prefix.is_empty()
			&& prefix.len() <= 253
			&& prefix
				.chars()
				.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.');
		if !valid_prefix {
			return Err(AgentError::InvalidInput(format!("invalid label key prefix in '{key}'")));
		}
	}
	if name.is_empty() || !is_label_token(name) {
		return Err(AgentError::InvalidInput(format!("invalid label key '{key}'")));
	}
	Ok(())
}

fn validate_value(value: &str) -> AgentResult<()> {
	if value.is_empty() || is_label_token(value) {
		Ok(())
	} else {
		Err(AgentError::InvalidInput(format!("invalid label value '{value}'")))
	}
}

/// `[A-Za-z0-9]([-A-Za-z0-9_.]*[A-Za-z0-9])?`, at most 63 characters.
fn is_label_token(s: &str) -> bool {
	let bytes = s.as_bytes();
	!bytes.is_empty()
		&& bytes.len() <= MAX_LABEL_VALUE_LEN
		&& bytes[0].is_ascii_alphanumeric()
		&& bytes[bytes.len() - 1].is_ascii_alphanumeric()
		&& bytes
			.iter()
			.all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

#[cfg(test)]
mod tests {
	use proptest::prelude::*;

	use super::*;

	fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
		pairs
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect()
	}

	#[test]
	fn selector_string_is_stable() {
		let selector = OwnershipSelector::new("web", "r1").unwrap();
		assert_eq!(
			selector.to_selector_string(),
			"helm.sh/chart=web,meta.helm.sh/release-name=r1"
		);
	}

	#[test]
	fn selector_requires_both_labels() {
		let selector = OwnershipSelector::new("web", "r1").unwrap();
		assert!(selector.matches(&labels(&[(CHART_LABEL, "web"), (RELEASE_LABEL, "r1")])));
		assert!(selector.matches(&labels(&[
			(CHART_LABEL, "web"),
			(RELEASE_LABEL, "r1"),
			("app", "extra"),
		])));
		assert!(!selector.matches(&labels(&[(CHART_LABEL, "web")])));
		assert!(!selector.matches(&labels(&[(RELEASE_LABEL, "r1")])));
		assert!(!selector.matches(&labels(&[(CHART_LABEL, "web"), (RELEASE_LABEL, "r2")])));
	}

	#[test]
	fn selector_rejects_unexpressible_values() {
		assert!(matches!(
			OwnershipSelector::new("web,evil=1", "r1"),
			Err(AgentError::InvalidInput(_))
		));
		assert!(OwnershipSelector::new("web", "").is_err());
		assert!(OwnershipSelector::new("web", "-r1").is_err());
	}

	#[test]
	fn label_set_replaces_duplicate_keys() {
		let set = LabelSet::new()
			.with(Label::new("app", "a").unwrap())
			.with(Label::new("app", "b").unwrap());
		assert_eq!(set.to_selector_string(), "app=b");
	}

	#[test]
	fn label_keys_are_validated() {
		assert!(Label::new("helm.sh/chart", "x").is_ok());
		assert!(Label::new("Bad Key", "x").is_err());
		assert!(Label::new("/name", "x").is_err());
	}

	#[test]
	fn job_pods_selector_uses_job_name() {
		assert_eq!(
			job_pods_selector("migrate-1").unwrap().to_selector_string(),
			"job-name=migrate-1"
		);
	}

	fn label_value() -> impl Strategy<Value = String> {
		"[a-z0-9]([a-z0-9-]{0,20}[a-z0-9])?"
	}

	proptest! {
		#[test]
		fn matches_exactly_when_both_labels_agree(
			chart in label_value(),
			release in label_value(),
			other_chart in label_value(),
			other_release in label_value(),
		) {
			let selector = OwnershipSelector::new(chart.as_str(), release.as_str()).unwrap();
			let candidate = labels(&[(CHART_LABEL, other_chart.as_str()), (RELEASE_LABEL, other_release.as_str())]);
			prop_assert_eq!(
				selector.matches(&candidate),
				chart == other_chart && release == other_release
			);
		}

		#[test]
		fn single_label_never_matches(chart in label_value(), release in label_value()) {
			let selector = OwnershipSelector::new(chart.as_str(), release.as_str()).unwrap();
			prop_assert!(!selector.matches(&labels(&[(CHART_LABEL, chart.as_str())])));
			prop_assert!(!selector.matches(&labels(&[(RELEASE_LABEL, release.as_str())])));
		}

		#[test]
		fn selector_string_round_trips_through_label_set(
			chart in label_value(),
			release in label_value(),
		) {
			let selector = OwnershipSelector::new(chart.as_str(), release.as_str()).unwrap();
			let parsed: BTreeMap<String, String> = selector
				.to_selector_string()
				.split(',')
				.filter_map(|kv| kv.split_once('='))
				.map(|(k, v)| (k.to_string(), v.to_string()))
				.collect();
			prop_assert!(selector.matches(&parsed));
		}
	}
}
