//! Resolved converters, one per payload type.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use parking_lot::RwLock;
use thiserror::Error;

use crate::converter::ConverterHandle;
use crate::sanitize::sanitize;

/// Errors raised when recording a converter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
	#[error("payload types {existing:?} and {incoming:?} both sanitize to {token:?}")]
	TokenCollision {
		token: String,
		existing: String,
		incoming: String,
	},
}

#[derive(Default)]
struct Inner {
	handles: HashMap<String, ConverterHandle>,
	/// Sanitized token to the payload type that first claimed it.
	tokens: HashMap<String, String>,
}

/// Converters resolved during a session, keyed by payload type.
///
/// Entries are only ever added; the registry lives as long as its owner. Failed
/// resolutions are never recorded, so they are retried on the next request.
#[derive(Default)]
pub struct ConverterRegistry {
	inner: RwLock<Inner>,
}

impl ConverterRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn get(&self, payload_type: &str) -> Option<ConverterHandle> {
		self.inner.read().handles.get(payload_type).cloned()
	}

	pub fn contains(&self, payload_type: &str) -> bool {
		self.inner.read().handles.contains_key(payload_type)
	}

	pub fn len(&self) -> usize {
		self.inner.read().handles.len()
	}

	pub fn is_empty(&self) -> bool {
		self.inner.read().handles.is_empty()
	}

	/// Payload types with a recorded converter, sorted.
	pub fn payload_types(&self) -> Vec<String> {
		let mut types: Vec<_> = self.inner.read().handles.keys().cloned().collect();
		types.sort();
		types
	}

	/// Fails if another payload type already claimed the sanitized token of `payload_type`.
	pub fn check_token(&self, payload_type: &str) -> Result<(), RegistryError> {
		let token = sanitize(payload_type);
		match self.inner.read().tokens.get(&token) {
			Some(existing) if existing != payload_type => Err(RegistryError::TokenCollision {
				token,
				existing: existing.clone(),
				incoming: payload_type.to_string(),
			}),
			_ => Ok(()),
		}
	}

	/// Records `handle` for `payload_type`, claiming its sanitized token.
	///
	/// Re-inserting the same payload type replaces the handle.
	pub fn insert(&self, payload_type: &str, handle: ConverterHandle) -> Result<(), RegistryError> {
		let token = sanitize(payload_type);
		let mut inner = self.inner.write();
		match inner.tokens.entry(token) {
			Entry::Occupied(oe) if oe.get() != payload_type => {
				return Err(RegistryError::TokenCollision {
					token: oe.key().clone(),
					existing: oe.get().clone(),
					incoming: payload_type.to_string(),
				});
			}
			Entry::Occupied(_) => {}
			Entry::Vacant(ve) => {
				ve.insert(payload_type.to_string());
			}
		}
		inner.handles.insert(payload_type.to_string(), handle);
		Ok(())
	}
}
