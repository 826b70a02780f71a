// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Redacting wrapper for credential material.
//!
//! Cluster bearer tokens, OAuth refresh tokens, client secrets and the values
//! of linked Kubernetes secrets all pass through Berth. [`Secret<T>`] keeps
//! them out of logs, error messages and serialized responses:
//!
//! - `Debug` and `Display` print [`REDACTED`]
//! - `Serialize` writes [`REDACTED`]; `Deserialize` reads the real value
//! - the inner value is zeroized on drop
//! - reading the value requires an explicit [`Secret::expose`]
//!
//! ```
//! use berth_common_secret::SecretString;
//!
//! let token = SecretString::new("eyJhbGciOi...".to_string());
//! assert_eq!(format!("{token}"), "[REDACTED]");
//! assert_eq!(token.expose(), "eyJhbGciOi...");
//! ```

use std::fmt;

use zeroize::Zeroize;

/// Text printed in place of any secret value.
pub const REDACTED: &str = "[REDACTED]";

/// A value that must never be printed, logged or serialized verbatim.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct Secret<T>
where
	T: Zeroize,
{
	inner: T,
}

/// Secret text, e.g. a bearer token.
pub type SecretString = Secret<String>;

/// Secret bytes, e.g. a value stored in a Kubernetes `Secret`.
pub type SecretBytes = Secret<Vec<u8>>;

impl<T> Secret<T>
where
	T: Zeroize,
{
	pub fn new(inner: T) -> Self {
		Self { inner }
	}

	/// Access the wrapped value. Every call site is an audit point.
	pub fn expose(&self) -> &T {
		&self.inner
	}

	/// Clone the wrapped value out. The original stays zeroize-on-drop.
	pub fn into_inner(self) -> T
	where
		T: Clone,
	{
		self.inner.clone()
	}
}

impl SecretString {
	pub fn is_empty(&self) -> bool {
		self.inner.is_empty()
	}
}

impl SecretBytes {
	pub fn is_empty(&self) -> bool {
		self.inner.is_empty()
	}
}

impl From<String> for SecretString {
	fn from(value: String) -> Self {
		Secret::new(value)
	}
}

impl From<&str> for SecretString {
	fn from(value: &str) -> Self {
		Secret::new(value.to_string())
	}
}

impl From<Vec<u8>> for SecretBytes {
	fn from(value: Vec<u8>) -> Self {
		Secret::new(value)
	}
}

impl<T> Clone for Secret<T>
where
	T: Zeroize + Clone,
{
	fn clone(&self) -> Self {
		Self {
			inner: self.inner.clone(),
		}
	}
}

impl<T> fmt::Debug for Secret<T>
where
	T: Zeroize,
{
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("Secret").field(&REDACTED).finish()
	}
}

impl<T> fmt::Display for Secret<T>
where
	T: Zeroize,
{
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(REDACTED)
	}
}

impl<T> PartialEq for Secret<T>
where
	T: Zeroize + PartialEq,
{
	fn eq(&self, other: &Self) -> bool {
		self.inner == other.inner
	}
}

impl<T> Eq for Secret<T> where T: Zeroize + Eq {}

#[cfg(feature = "serde")]
mod serde_impl {
	use serde::{Deserialize, Deserializer, Serialize, Serializer};
	use zeroize::Zeroize;

	use super::{Secret, REDACTED};

	impl<T> Serialize for Secret<T>
	where
		T: Serialize + Zeroize,
	{
		fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
		where
			S: Serializer,
		{
			serializer.serialize_str(REDACTED)
		}
	}

	impl<'de, T> Deserialize<'de> for Secret<T>
	where
		T: Deserialize<'de> + Zeroize,
	{
		fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
		where
			D: Deserializer<'de>,
		{
			T::deserialize(deserializer).map(Secret::new)
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[derive(Debug)]
	#[allow(dead_code)]
	struct StoredCredential {
		cluster: String,
		token: SecretString,
		refresh_token: Option<SecretString>,
	}

	#[test]
	fn credential_debug_hides_token_material() {
		let cred = StoredCredential {
			cluster: "prod-east".to_string(),
			token: SecretString::from("bearer-abc"),
			refresh_token: Some(SecretString::from("refresh-xyz")),
		};
		let out = format!("{cred:?}");

		assert!(out.contains("prod-east"));
		assert!(!out.contains("bearer-abc"));
		assert!(!out.contains("refresh-xyz"));
		assert_eq!(out.matches(REDACTED).count(), 2);
	}

	#[test]
	fn error_message_formatting_is_redacted() {
		let token = SecretString::from("bearer-abc");
		let msg = format!("cluster rejected token {token}");
		assert_eq!(msg, "cluster rejected token [REDACTED]");
	}

	#[test]
	fn secret_bytes_expose_raw_value() {
		let value = SecretBytes::from(b"hunter2".to_vec());
		assert_eq!(value.expose(), b"hunter2");
		assert!(!value.is_empty());
		assert!(SecretBytes::from(Vec::new()).is_empty());
	}

	#[test]
	fn into_inner_and_clone_keep_value() {
		let token = SecretString::from("t0k3n");
		let copy = token.clone();
		assert_eq!(token, copy);
		assert_eq!(copy.into_inner(), "t0k3n");
	}

	#[test]
	fn serialize_writes_placeholder() {
		let token = SecretString::from("bearer-abc");
		let json = serde_json::to_string(&token).unwrap();
		assert_eq!(json, format!("\"{REDACTED}\""));
	}

	#[test]
	fn deserialize_reads_real_value() {
		let token: SecretString = serde_json::from_str("\"bearer-abc\"").unwrap();
		assert_eq!(token.expose(), "bearer-abc");
	}

	proptest! {
		#[test]
		fn display_and_debug_never_leak(inner in "[a-z0-9]{12,40}") {
			let secret = SecretString::new(inner.clone());
			let displayed = format!("{secret}");
			let debugged = format!("{secret:?}");
			prop_assert!(!displayed.contains(&inner));
			prop_assert!(!debugged.contains(&inner));
		}

		#[test]
		fn json_never_leaks(inner in "[a-z0-9]{12,40}") {
			let secret = SecretString::new(inner.clone());
			let json = serde_json::to_string(&secret).unwrap();
			prop_assert!(!json.contains(&inner));
		}
	}
}
