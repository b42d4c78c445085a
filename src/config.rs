// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Manifest layout.
//!
//! Specify the layout of the manifest that declares every tracked part and
//! pinned checkout. The manifest is written in TOML by default, but a manifest
//! whose file name ends in `.json` is read as JSON instead so older
//! `info.json` style records keep working.
//!
//! # General Layout
//!
//! ```toml
//! editor = "nvim"
//! directories = ["piston/undodir"]
//!
//! [part.claudecode]
//! repo = "coder/claudecode.nvim"
//! commit = "93f8e48b1f6cbf2469b378c20b3df4115252d379"
//! sparse = ["lua/", "plugin/"]
//! data-path = "external/claudecode.nvim"
//! config-path = "."
//! patch = "claudecode.patch"
//!
//! [checkout.lazy]
//! repo = "folke/lazy.nvim"
//! ref = "v11.17.1"
//! data-path = "lazy/lazy.nvim"
//! ```
//!
//! Relative paths are resolved against the editor's data directory
//! (`data-path`) or configuration directory (`config-path`, `patch`). See
//! [`Layout`](crate::path::Layout).

use crate::{part::TrackedPart, path::Layout, sync::scratch::CheckoutTarget};

use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashSet},
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Component, Path, PathBuf},
    str::FromStr,
};

/// Editor used when the manifest does not name one.
pub const DEFAULT_EDITOR: &str = "nvim";

/// Declarative record of everything forkpatch manages.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Manifest {
    /// Editor whose standard directories anchor relative paths.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub editor: Option<String>,

    /// Directories to create under the data directory during bootstrap.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub directories: Vec<String>,

    /// Patched third-party trees keyed by part name.
    #[serde(default, rename = "part", skip_serializing_if = "BTreeMap::is_empty")]
    pub parts: BTreeMap<String, PartDefinition>,

    /// Pinned checkouts installed as is during bootstrap.
    #[serde(default, rename = "checkout", skip_serializing_if = "BTreeMap::is_empty")]
    pub checkouts: BTreeMap<String, CheckoutDefinition>,
}

impl Manifest {
    /// Load manifest from target path.
    ///
    /// Files ending in `.json` are parsed as JSON, everything else as TOML.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if manifest cannot be read.
    /// - Return [`ConfigError::Deserialize`] or [`ConfigError::DeserializeJson`]
    ///   if manifest is malformed.
    /// - Return [`ConfigError::ShellExpansion`] if path expansion fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = read_to_string(path).map_err(|err| ConfigError::Read {
            source: err,
            path: path.into(),
        })?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&data)
        } else {
            data.parse()
        }
    }

    /// Parse manifest from JSON data.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::DeserializeJson`] if data is malformed.
    /// - Return [`ConfigError::ShellExpansion`] if path expansion fails.
    pub fn from_json_str(data: &str) -> Result<Self> {
        let manifest: Manifest = serde_json::from_str(data)?;
        manifest.finalize()
    }

    /// Name of editor whose directories anchor relative paths.
    pub fn editor(&self) -> &str {
        self.editor.as_deref().unwrap_or(DEFAULT_EDITOR)
    }

    /// Select part by name, or the only configured part if no name is given.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::UnknownPart`] if no part has target name.
    /// - Return [`ConfigError::AmbiguousPart`] if no name is given and zero or
    ///   several parts are configured.
    pub fn select_part(&self, name: Option<&str>) -> Result<(&str, &PartDefinition)> {
        match name {
            Some(name) => self
                .parts
                .get_key_value(name)
                .map(|(key, part)| (key.as_str(), part))
                .ok_or_else(|| ConfigError::UnknownPart {
                    name: name.into(),
                    known: self.part_names(),
                }),
            None if self.parts.len() == 1 => self
                .parts
                .iter()
                .next()
                .map(|(key, part)| (key.as_str(), part))
                .ok_or_else(|| ConfigError::AmbiguousPart {
                    known: self.part_names(),
                }),
            None => Err(ConfigError::AmbiguousPart {
                known: self.part_names(),
            }),
        }
    }

    /// Resolve part into a [`TrackedPart`] with absolute paths.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::UnknownPart`] or [`ConfigError::AmbiguousPart`]
    ///   if the part cannot be selected.
    pub fn resolve_part(&self, name: Option<&str>, layout: &Layout) -> Result<TrackedPart> {
        let (name, definition) = self.select_part(name)?;
        Ok(definition.resolve(name, layout))
    }

    /// Resolve every pinned checkout into a [`CheckoutTarget`].
    pub fn resolve_checkouts(&self, layout: &Layout) -> Vec<CheckoutTarget> {
        self.checkouts
            .iter()
            .map(|(name, checkout)| checkout.resolve(name, layout))
            .collect()
    }

    fn part_names(&self) -> String {
        self.parts.keys().cloned().collect::<Vec<_>>().join(", ")
    }

    fn finalize(mut self) -> Result<Self> {
        // INVARIANT: Perform shell expansion on every path field.
        for part in self.parts.values_mut() {
            part.data_path = expand_path(&part.data_path)?;
            part.config_path = expand_path(&part.config_path)?;
            part.patch = expand_path(&part.patch)?;
        }
        for checkout in self.checkouts.values_mut() {
            checkout.data_path = expand_path(&checkout.data_path)?;
        }

        // INVARIANT: Every part tracks a non-empty set of unique sparse paths.
        for (name, part) in &self.parts {
            if part.sparse.is_empty() {
                return Err(ConfigError::NoSparsePaths { part: name.clone() });
            }
            validate_unique(name, &part.sparse)?;
        }
        for (name, checkout) in &self.checkouts {
            validate_unique(name, &checkout.sparse)?;
        }

        Ok(self)
    }
}

impl FromStr for Manifest {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let manifest: Manifest = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;
        manifest.finalize()
    }
}

impl Display for Manifest {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Third-party tree kept in sync through a patch file.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PartDefinition {
    /// Remote locator, either `owner/name` on GitHub or a full URL.
    #[serde(alias = "repository")]
    pub repo: String,

    /// Pinned upstream commit the patch applies to.
    pub commit: String,

    /// Tracked path prefixes relative to the repository root.
    pub sparse: Vec<SparsePath>,

    /// Scratch checkout location relative to the data directory.
    pub data_path: PathBuf,

    /// Live tree location relative to the configuration directory.
    #[serde(default = "default_config_path")]
    pub config_path: PathBuf,

    /// Patch file location relative to the configuration directory.
    pub patch: PathBuf,
}

impl PartDefinition {
    /// Resolve part definition against editor layout.
    pub fn resolve(&self, name: &str, layout: &Layout) -> TrackedPart {
        TrackedPart {
            name: name.into(),
            repository: self.repo.clone(),
            pinned_commit: self.commit.clone(),
            sparse_paths: self.sparse.clone(),
            scratch_path: layout.data_path(&self.data_path),
            local_path: layout.config_path(&self.config_path),
            patch_path: layout.config_path(&self.patch),
        }
    }
}

/// Pinned checkout installed without any patching.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct CheckoutDefinition {
    /// Remote locator, either `owner/name` on GitHub or a full URL.
    #[serde(alias = "repository")]
    pub repo: String,

    /// Tag, branch, or commit to check out.
    #[serde(rename = "ref", alias = "tag")]
    pub reference: String,

    /// Checkout location relative to the data directory.
    pub data_path: PathBuf,

    /// Optional path prefixes to restrict the checkout to.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sparse: Vec<SparsePath>,

    /// Fetch only the target reference at depth one.
    #[serde(default)]
    pub shallow: bool,
}

impl CheckoutDefinition {
    /// Resolve checkout definition against editor layout.
    pub fn resolve(&self, name: &str, layout: &Layout) -> CheckoutTarget {
        CheckoutTarget {
            name: name.into(),
            repository: self.repo.clone(),
            reference: self.reference.clone(),
            path: layout.data_path(&self.data_path),
            sparse: self.sparse.clone(),
            shallow: self.shallow,
        }
    }
}

/// Relative path prefix tracked through sparse checkout.
///
/// Written the way sparse checkout rules are written, e.g., `lua/` for a
/// directory or `plugin/init.lua` for a single file.
///
/// # Invariant
///
/// - Never empty.
/// - Never absolute.
/// - Never escapes repository root through `..`.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct SparsePath(String);

impl SparsePath {
    /// Sparse checkout rule form, e.g., `lua/`.
    pub fn as_rule(&self) -> &str {
        self.0.as_str()
    }

    /// Path form relative to a tree root, without trailing separator.
    pub fn relative(&self) -> &Path {
        Path::new(self.0.trim_end_matches('/'))
    }
}

impl TryFrom<String> for SparsePath {
    type Error = SparsePathError;

    fn try_from(rule: String) -> Result<Self, Self::Error> {
        let trimmed = rule.trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(SparsePathError::Empty);
        }

        let path = Path::new(trimmed);
        if rule.starts_with('/') || path.is_absolute() {
            return Err(SparsePathError::Absolute(rule));
        }

        let mut parts = Vec::new();
        for component in path.components() {
            match component {
                Component::CurDir => continue,
                Component::RootDir => return Err(SparsePathError::Absolute(rule)),
                Component::ParentDir | Component::Prefix(_) => {
                    return Err(SparsePathError::EscapesRoot(rule))
                }
                Component::Normal(part) => parts.push(part.to_string_lossy()),
            }
        }

        // INVARIANT: Mirroring a sparse path replaces it wholesale, so it must name
        // something below the root.
        if parts.is_empty() {
            return Err(SparsePathError::RootItself(rule));
        }

        let mut normalized = parts.join("/");
        if rule.ends_with('/') {
            normalized.push('/');
        }

        Ok(Self(normalized))
    }
}

impl TryFrom<&str> for SparsePath {
    type Error = SparsePathError;

    fn try_from(rule: &str) -> Result<Self, Self::Error> {
        Self::try_from(rule.to_owned())
    }
}

impl From<SparsePath> for String {
    fn from(path: SparsePath) -> Self {
        path.0
    }
}

impl Display for SparsePath {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_rule())
    }
}

fn default_config_path() -> PathBuf {
    PathBuf::from(".")
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    Ok(PathBuf::from(
        shellexpand::full(path.to_string_lossy().as_ref())?.into_owned(),
    ))
}

fn validate_unique(name: &str, sparse: &[SparsePath]) -> Result<()> {
    let mut seen = HashSet::new();
    for path in sparse {
        if !seen.insert(path.relative()) {
            return Err(ConfigError::DuplicateSparsePath {
                part: name.into(),
                path: path.to_string(),
            });
        }
    }

    Ok(())
}

/// Sparse path validation error types.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SparsePathError {
    #[error("sparse path cannot be empty")]
    Empty,

    #[error("sparse path {0:?} must be relative to the repository root")]
    Absolute(String),

    #[error("sparse path {0:?} cannot leave the repository root")]
    EscapesRoot(String),

    #[error("sparse path {0:?} names the repository root itself")]
    RootItself(String),
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read manifest file.
    #[error("failed to read manifest at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize TOML manifest.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to deserialize JSON manifest.
    #[error(transparent)]
    DeserializeJson(#[from] serde_json::Error),

    /// Failed to serialize manifest.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on manifest path.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Part does not track any sparse path.
    #[error("part {part:?} must list at least one sparse path")]
    NoSparsePaths { part: String },

    /// Part lists the same sparse path twice.
    #[error("part {part:?} lists sparse path {path:?} more than once")]
    DuplicateSparsePath { part: String, path: String },

    /// No part has the requested name.
    #[error("unknown part {name:?} (configured parts: {known})")]
    UnknownPart { name: String, known: String },

    /// Part name must be given explicitly.
    #[error("name the part to use (configured parts: {known})")]
    AmbiguousPart { known: String },
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
