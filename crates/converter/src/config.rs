//! Area layout and toolchain settings.
//!
//! The converter works inside a development area (`CMSSW_BASE`) built for one
//! architecture (`SCRAM_ARCH`). A developer checkout additionally points at the release
//! it was created from (`CMSSW_RELEASE_BASE`); its presence is what allows converters
//! to be built on demand.
//!
//! Settings come from the environment and may be overlaid by a TOML file:
//!
//! ```toml
//! base_dir = "/work/CMSSW_14_0_0"
//! release_dir = "/cvmfs/cms.cern.ch/el9_amd64_gcc12/cms/cmssw/CMSSW_14_0_0"
//! arch = "el9_amd64_gcc12"
//!
//! [build]
//! command = "scram b -j 4"
//! env_setup = ". /cvmfs/cms.cern.ch/cmsset_default.sh"
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::sanitize::{library_file_name, plugin_library_name, sanitize};

/// Variable naming the writable development area.
pub const BASE_DIR_VAR: &str = "CMSSW_BASE";
/// Variable naming the release a development area was checked out from.
pub const RELEASE_DIR_VAR: &str = "CMSSW_RELEASE_BASE";
/// Variable naming the platform/architecture tag.
pub const ARCH_VAR: &str = "SCRAM_ARCH";

const DEFAULT_BUILD_COMMAND: &str = "scram b";
const DEFAULT_ENV_SETUP: &str = ". /cvmfs/cms.cern.ch/cmsset_default.sh";

/// Errors that can occur while assembling the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("environment variable {0} is not set")]
	MissingVar(&'static str),

	#[error("I/O error reading {path}: {error}")]
	Io {
		path: PathBuf,
		error: std::io::Error,
	},

	#[error("failed to parse {path}: {error}")]
	Parse {
		path: PathBuf,
		error: toml::de::Error,
	},

	#[error("missing required setting: {0}")]
	MissingField(&'static str),

	#[error("{0} is not a developer area: {1} does not exist")]
	NotDevelopmentArea(PathBuf, PathBuf),
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// How on-demand builds invoke the external toolchain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSettings {
	/// Build command run inside the staging directory.
	pub command: String,
	/// Shell snippet sourced before the build command, if any.
	pub env_setup: Option<String>,
}

impl Default for BuildSettings {
	fn default() -> Self {
		Self {
			command: DEFAULT_BUILD_COMMAND.to_string(),
			env_setup: Some(DEFAULT_ENV_SETUP.to_string()),
		}
	}
}

/// Resolved converter configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
	/// Writable development area root.
	pub base_dir: PathBuf,
	/// Release area used as a read-only fallback; `None` in a plain release.
	pub release_dir: Option<PathBuf>,
	/// Architecture tag selecting `lib/<arch>`.
	pub arch: String,
	pub build: BuildSettings,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
	base_dir: Option<PathBuf>,
	release_dir: Option<PathBuf>,
	arch: Option<String>,
	#[serde(default)]
	build: BuildFile,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct BuildFile {
	command: Option<String>,
	env_setup: Option<String>,
}

impl Config {
	pub fn new(base_dir: impl Into<PathBuf>, release_dir: Option<PathBuf>, arch: impl Into<String>) -> Self {
		Self {
			base_dir: base_dir.into(),
			release_dir,
			arch: arch.into(),
			build: BuildSettings::default(),
		}
	}

	/// Reads the area layout from the process environment.
	pub fn from_env() -> Result<Self> {
		Self::from_vars(|name| std::env::var(name).ok())
	}

	/// Reads the area layout through `lookup`, which maps a variable name to its value.
	pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
		let non_empty = |name: &str| lookup(name).filter(|v| !v.is_empty());
		let base_dir = non_empty(BASE_DIR_VAR).ok_or(ConfigError::MissingVar(BASE_DIR_VAR))?;
		let arch = non_empty(ARCH_VAR).ok_or(ConfigError::MissingVar(ARCH_VAR))?;
		let release_dir = non_empty(RELEASE_DIR_VAR).map(PathBuf::from);
		Ok(Self::new(base_dir, release_dir, arch))
	}

	/// Reads the environment, then overlays `file` when given.
	pub fn from_env_and_file(file: Option<&Path>) -> Result<Self> {
		Self::from_vars_and_file(|name| std::env::var(name).ok(), file)
	}

	/// Like [`Config::from_env_and_file`], with variables read through `lookup`.
	///
	/// When the variables do not describe an area, a given file has to supply the whole
	/// layout on its own.
	pub fn from_vars_and_file(lookup: impl Fn(&str) -> Option<String>, file: Option<&Path>) -> Result<Self> {
		match (Self::from_vars(lookup), file) {
			(Ok(config), Some(path)) => config.merge_file(path),
			(Ok(config), None) => Ok(config),
			(Err(ConfigError::MissingVar(var)), Some(path)) => {
				tracing::debug!(missing = var, file = %path.display(), "Area layout taken from configuration file");
				Self::load(path)
			}
			(Err(e), _) => Err(e),
		}
	}

	/// Loads a configuration entirely from a TOML file.
	pub fn load(path: &Path) -> Result<Self> {
		let file = read_file(path)?;
		let base_dir = file.base_dir.ok_or(ConfigError::MissingField("base_dir"))?;
		let arch = file.arch.ok_or(ConfigError::MissingField("arch"))?;
		let mut config = Self::new(base_dir, file.release_dir, arch);
		config.apply_build(file.build);
		Ok(config)
	}

	/// Overlays the settings present in a TOML file on this configuration.
	pub fn merge_file(mut self, path: &Path) -> Result<Self> {
		let file = read_file(path)?;
		if let Some(base_dir) = file.base_dir {
			self.base_dir = base_dir;
		}
		if let Some(release_dir) = file.release_dir {
			self.release_dir = Some(release_dir);
		}
		if let Some(arch) = file.arch {
			self.arch = arch;
		}
		self.apply_build(file.build);
		Ok(self)
	}

	fn apply_build(&mut self, build: BuildFile) {
		if let Some(command) = build.command {
			self.build.command = command;
		}
		if let Some(env_setup) = build.env_setup {
			self.build.env_setup = (!env_setup.trim().is_empty()).then_some(env_setup);
		}
	}

	/// Checks that the base area is a developer area with a `src/` tree.
	pub fn validate(&self) -> Result<()> {
		let src = self.base_dir.join("src");
		if !src.is_dir() {
			return Err(ConfigError::NotDevelopmentArea(self.base_dir.clone(), src));
		}
		Ok(())
	}

	/// Whether converters may be built on demand in this area.
	pub fn is_development_area(&self) -> bool {
		self.release_dir.is_some()
	}

	/// Library directory of the development area.
	pub fn lib_dir(&self) -> PathBuf {
		self.base_dir.join("lib").join(&self.arch)
	}

	/// Library directory of the release, when one is configured.
	pub fn release_lib_dir(&self) -> Option<PathBuf> {
		self.release_dir.as_ref().map(|dir| dir.join("lib").join(&self.arch))
	}

	/// Type-specific converter library for `payload_type` in the development area.
	pub fn local_library(&self, payload_type: &str) -> PathBuf {
		self.lib_dir().join(library_file_name(&plugin_library_name(&sanitize(payload_type))))
	}
}

fn read_file(path: &Path) -> Result<ConfigFile> {
	let content = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
		path: path.to_path_buf(),
		error,
	})?;
	toml::from_str(&content).map_err(|error| ConfigError::Parse {
		path: path.to_path_buf(),
		error,
	})
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use super::*;

	fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
		let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
		move |name: &str| map.get(name).cloned()
	}

	#[test]
	fn developer_checkout_from_vars() {
		let config = Config::from_vars(vars(&[
			("CMSSW_BASE", "/work/area"),
			("CMSSW_RELEASE_BASE", "/release"),
			("SCRAM_ARCH", "el9_amd64_gcc12"),
		]))
		.unwrap();

		assert!(config.is_development_area());
		assert_eq!(config.lib_dir(), PathBuf::from("/work/area/lib/el9_amd64_gcc12"));
		assert_eq!(config.release_lib_dir(), Some(PathBuf::from("/release/lib/el9_amd64_gcc12")));
		assert_eq!(config.build, BuildSettings::default());
	}

	#[test]
	fn plain_release_has_no_fallback() {
		let config = Config::from_vars(vars(&[("CMSSW_BASE", "/release"), ("CMSSW_RELEASE_BASE", ""), ("SCRAM_ARCH", "x")])).unwrap();
		assert!(!config.is_development_area());
		assert_eq!(config.release_lib_dir(), None);
	}

	#[test]
	fn missing_vars_are_reported() {
		let err = Config::from_vars(vars(&[("SCRAM_ARCH", "x")])).unwrap_err();
		assert!(matches!(err, ConfigError::MissingVar("CMSSW_BASE")));

		let err = Config::from_vars(vars(&[("CMSSW_BASE", "/a")])).unwrap_err();
		assert!(matches!(err, ConfigError::MissingVar("SCRAM_ARCH")));
	}

	#[test]
	fn file_overlays_environment() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("condxml.toml");
		std::fs::write(
			&path,
			r#"
            release_dir = "/other/release"

            [build]
            command = "scram b -j 8"
            env_setup = ""
        "#,
		)
		.unwrap();

		let config = Config::new("/work/area", None, "arch").merge_file(&path).unwrap();
		assert_eq!(config.base_dir, PathBuf::from("/work/area"));
		assert_eq!(config.release_dir, Some(PathBuf::from("/other/release")));
		assert_eq!(config.build.command, "scram b -j 8");
		assert_eq!(config.build.env_setup, None);
	}

	#[test]
	fn load_requires_layout_fields() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("condxml.toml");
		std::fs::write(&path, "base_dir = \"/work\"\n").unwrap();
		assert!(matches!(Config::load(&path), Err(ConfigError::MissingField("arch"))));

		std::fs::write(&path, "base_dir = \"/work\"\narch = \"a\"\nbogus = 1\n").unwrap();
		assert!(matches!(Config::load(&path), Err(ConfigError::Parse { .. })));
	}

	#[test]
	fn file_stands_in_for_missing_environment() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("condxml.toml");
		std::fs::write(&path, "base_dir = \"/work\"\nrelease_dir = \"/release\"\narch = \"el9\"\n").unwrap();

		let config = Config::from_vars_and_file(vars(&[]), Some(&path)).unwrap();
		assert_eq!(config.base_dir, PathBuf::from("/work"));
		assert_eq!(config.release_dir, Some(PathBuf::from("/release")));
		assert_eq!(config.arch, "el9");

		let config = Config::from_vars_and_file(vars(&[("CMSSW_BASE", "/env"), ("SCRAM_ARCH", "x")]), Some(&path)).unwrap();
		assert_eq!(config.base_dir, PathBuf::from("/work"));

		let err = Config::from_vars_and_file(vars(&[]), None).unwrap_err();
		assert!(matches!(err, ConfigError::MissingVar("CMSSW_BASE")));

		std::fs::write(&path, "[build]\ncommand = \"make\"\n").unwrap();
		let err = Config::from_vars_and_file(vars(&[]), Some(&path)).unwrap_err();
		assert!(matches!(err, ConfigError::MissingField("base_dir")));
	}

	#[test]
	fn validate_requires_src_tree() {
		let dir = tempfile::tempdir().unwrap();
		let config = Config::new(dir.path(), None, "arch");
		assert!(matches!(config.validate(), Err(ConfigError::NotDevelopmentArea(..))));

		std::fs::create_dir(dir.path().join("src")).unwrap();
		config.validate().unwrap();
	}
}
