//! Layered configuration.
//!
//! Values come from, in increasing precedence: built-in defaults, a TOML file
//! (an explicit path, or `repodata.toml` in the platform config directory) and
//! `REPODATA_*` environment variables. Everything is validated on load, so a
//! bad digest or compression name stops the program before a run starts.

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use repodata_checksum::Algorithm;
use repodata_compress::Compression;
use repodata_metadata::{Naming, UpdateMode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "REPODATA_";
pub const FILE_NAME: &str = "repodata.toml";

/// `repodata.toml` in the platform config directory, if there is one.
pub fn default_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "repodata").map(|dirs| dirs.config_dir().join(FILE_NAME))
}

/// Configuration as written by the user, before validation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
struct RawConfig {
    digest: String,
    naming: String,
    compression: String,
    mode: String,
    dry_run: bool,
    packages_prefix: Option<PathBuf>,
    skip_invalid: bool,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            digest: Algorithm::default().to_string(),
            naming: Naming::default().to_string(),
            compression: Compression::Gzip.to_string(),
            mode: UpdateMode::default().to_string(),
            dry_run: false,
            packages_prefix: None,
            skip_invalid: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Digest for package identifiers and document checksums.
    pub digest: Algorithm,
    pub naming: Naming,
    /// Compression of the published documents. Never `none`.
    pub compression: Compression,
    pub mode: UpdateMode,
    pub dry_run: bool,
    /// Storage prefix scanned for archives; the repository root when unset.
    pub packages_prefix: Option<PathBuf>,
    pub skip_invalid: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            digest: Algorithm::default(),
            naming: Naming::default(),
            compression: Compression::Gzip,
            mode: UpdateMode::default(),
            dry_run: false,
            packages_prefix: None,
            skip_invalid: true,
        }
    }
}

impl Config {
    /// The layered sources, without extracting anything.
    ///
    /// A missing file at the default location is not an error.
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(RawConfig::default()));
        if let Some(file) = path.map(Path::to_path_buf).or_else(default_path) {
            figment = figment.merge(Toml::file_exact(file));
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Load and validate. An explicit `path` must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path
            && !path.is_file()
        {
            exn::bail!(ErrorKind::Missing(path.to_path_buf()));
        }
        Self::from_figment(&Self::figment(path))
    }

    pub fn from_figment(figment: &Figment) -> Result<Self> {
        let raw: RawConfig = figment.extract().or_raise(|| ErrorKind::Load)?;
        let config = Self::try_from(raw)?;
        tracing::debug!(?config, "loaded configuration");
        Ok(config)
    }
}

fn invalid(field: &'static str, value: &str) -> ErrorKind {
    ErrorKind::Invalid { field, value: value.to_string() }
}

impl TryFrom<RawConfig> for Config {
    type Error = error::Error;

    fn try_from(raw: RawConfig) -> Result<Self> {
        let compression = raw.compression.parse::<Compression>().or_raise(|| invalid("compression", &raw.compression))?;
        if compression == Compression::None {
            exn::bail!(invalid("compression", &raw.compression));
        }
        Ok(Self {
            digest: raw.digest.parse::<Algorithm>().or_raise(|| invalid("digest", &raw.digest))?,
            naming: raw.naming.parse::<Naming>().or_raise(|| invalid("naming", &raw.naming))?,
            compression,
            mode: raw.mode.parse::<UpdateMode>().or_raise(|| invalid("mode", &raw.mode))?,
            dry_run: raw.dry_run,
            packages_prefix: raw.packages_prefix.filter(|p| !p.as_os_str().is_empty()),
            skip_invalid: raw.skip_invalid,
        })
    }
}
