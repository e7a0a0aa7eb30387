//! Payload fetching.
//!
//! The conditions database itself lives outside this crate; conversion only needs
//! "bytes and type name by key". [`PayloadTable`] is an in-memory implementation,
//! loadable from a JSON manifest, used by the command-line tool and tests.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Errors raised while fetching a payload.
#[derive(Debug, Error)]
pub enum FetchError {
	#[error("no payload found for key {0}")]
	NotFound(String),
	#[error("{matches} payloads match key {key}, expected exactly one")]
	Ambiguous { key: String, matches: usize },
	#[error("payload backend error: {0}")]
	Backend(String),
}

/// Raw payload bytes together with the runtime type they were serialized from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
	pub data: Vec<u8>,
	pub object_type: String,
}

/// Source of payloads addressed by key (a content hash in the conditions database).
pub trait PayloadFetcher {
	/// Returns the single payload stored under `key`.
	fn fetch_by_key(&self, key: &str) -> Result<Payload, FetchError>;
}

#[derive(Debug, Clone)]
struct Row {
	hash: String,
	payload: Payload,
}

/// In-memory payload table with exactly-one-match lookup.
#[derive(Debug, Clone, Default)]
pub struct PayloadTable {
	rows: Vec<Row>,
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
	hash: String,
	object_type: String,
	file: PathBuf,
}

impl PayloadTable {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&mut self, hash: impl Into<String>, object_type: impl Into<String>, data: impl Into<Vec<u8>>) {
		self.rows.push(Row {
			hash: hash.into(),
			payload: Payload {
				data: data.into(),
				object_type: object_type.into(),
			},
		});
	}

	pub fn len(&self) -> usize {
		self.rows.len()
	}

	pub fn is_empty(&self) -> bool {
		self.rows.is_empty()
	}

	/// Reads a JSON manifest of `{ "hash", "object_type", "file" }` entries.
	///
	/// Relative `file` paths are resolved against the manifest's directory.
	pub fn from_manifest(path: &Path) -> Result<Self, FetchError> {
		let content = std::fs::read_to_string(path).map_err(|e| FetchError::Backend(format!("reading {}: {e}", path.display())))?;
		let entries: Vec<ManifestEntry> =
			serde_json::from_str(&content).map_err(|e| FetchError::Backend(format!("parsing {}: {e}", path.display())))?;

		let root = path.parent().unwrap_or(Path::new("."));
		let mut table = Self::new();
		for entry in entries {
			let file = root.join(&entry.file);
			let data = std::fs::read(&file).map_err(|e| FetchError::Backend(format!("reading {}: {e}", file.display())))?;
			table.insert(entry.hash, entry.object_type, data);
		}
		tracing::debug!(manifest = %path.display(), rows = table.len(), "Loaded payload table");
		Ok(table)
	}
}

impl PayloadFetcher for PayloadTable {
	fn fetch_by_key(&self, key: &str) -> Result<Payload, FetchError> {
		let mut matches = self.rows.iter().filter(|row| row.hash == key);
		let Some(first) = matches.next() else {
			return Err(FetchError::NotFound(key.to_string()));
		};
		let extra = matches.count();
		if extra > 0 {
			return Err(FetchError::Ambiguous {
				key: key.to_string(),
				matches: extra + 1,
			});
		}
		Ok(first.payload.clone())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn fetches_exactly_one_row() {
		let mut table = PayloadTable::new();
		table.insert("abc", "FooPayload", b"\x01\x02".to_vec());
		table.insert("def", "BarPayload", b"".to_vec());

		let payload = table.fetch_by_key("abc").unwrap();
		assert_eq!(payload.object_type, "FooPayload");
		assert_eq!(payload.data, b"\x01\x02");
	}

	#[test]
	fn absent_and_duplicated_keys() {
		let mut table = PayloadTable::new();
		table.insert("dup", "A", b"1".to_vec());
		table.insert("dup", "A", b"2".to_vec());

		assert!(matches!(table.fetch_by_key("missing"), Err(FetchError::NotFound(k)) if k == "missing"));
		assert!(matches!(table.fetch_by_key("dup"), Err(FetchError::Ambiguous { matches: 2, .. })));
	}

	#[test]
	fn manifest_files_resolve_relative_to_manifest() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::create_dir(dir.path().join("blobs")).unwrap();
		std::fs::write(dir.path().join("blobs/abc.bin"), b"\x01\x02").unwrap();
		let manifest = dir.path().join("payloads.json");
		std::fs::write(&manifest, r#"[{ "hash": "abc", "object_type": "FooPayload", "file": "blobs/abc.bin" }]"#).unwrap();

		let table = PayloadTable::from_manifest(&manifest).unwrap();
		assert_eq!(table.len(), 1);
		assert_eq!(table.fetch_by_key("abc").unwrap().data, b"\x01\x02");
	}

	#[test]
	fn manifest_with_missing_blob_is_a_backend_error() {
		let dir = tempfile::tempdir().unwrap();
		let manifest = dir.path().join("payloads.json");
		std::fs::write(&manifest, r#"[{ "hash": "abc", "object_type": "FooPayload", "file": "nope.bin" }]"#).unwrap();
		assert!(matches!(PayloadTable::from_manifest(&manifest), Err(FetchError::Backend(_))));
	}
}
