// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration layer for merging from multiple sources.

use serde::Deserialize;

use crate::sections::{AgentConfigLayer, LoggingConfigLayer, OAuthConfigLayer};

/// Server configuration layer - all fields are Option for merging.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfigLayer {
	#[serde(default)]
	pub agent: Option<AgentConfigLayer>,
	#[serde(default)]
	pub oauth: Option<OAuthConfigLayer>,
	#[serde(default)]
	pub logging: Option<LoggingConfigLayer>,
}

impl ServerConfigLayer {
	/// Merge another layer into this one. Other layer takes precedence.
	pub fn merge(&mut self, other: ServerConfigLayer) {
		merge_option(&mut self.agent, other.agent, AgentConfigLayer::merge);
		merge_option(&mut self.oauth, other.oauth, OAuthConfigLayer::merge);
		merge_option(&mut self.logging, other.logging, LoggingConfigLayer::merge);
	}
}

fn merge_option<T, F>(target: &mut Option<T>, source: Option<T>, merge_fn: F)
where
	F: FnOnce(&mut T, T),
{
	match (target.as_mut(), source) {
		(Some(t), Some(s)) => merge_fn(t, s),
		(None, Some(s)) => *target = Some(s),
		_ => {}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_merge_empty_layers() {
		let mut base = ServerConfigLayer::default();
		base.merge(ServerConfigLayer::default());
		assert!(base.agent.is_none());
		assert!(base.oauth.is_none());
	}

	#[test]
	fn test_merge_fills_missing_section() {
		let mut base = ServerConfigLayer::default();
		base.merge(ServerConfigLayer {
			agent: Some(AgentConfigLayer {
				request_timeout_secs: Some(12),
				..Default::default()
			}),
			..Default::default()
		});
		assert_eq!(base.agent.unwrap().request_timeout_secs, Some(12));
	}

	#[test]
	fn test_merge_combines_fields_within_section() {
		let mut base = ServerConfigLayer {
			agent: Some(AgentConfigLayer {
				request_timeout_secs: Some(12),
				..Default::default()
			}),
			..Default::default()
		};
		base.merge(ServerConfigLayer {
			agent: Some(AgentConfigLayer {
				testing: Some(true),
				..Default::default()
			}),
			..Default::default()
		});
		let agent = base.agent.unwrap();
		assert_eq!(agent.request_timeout_secs, Some(12));
		assert_eq!(agent.testing, Some(true));
	}
}
