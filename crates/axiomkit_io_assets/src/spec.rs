//! Asset pattern models, engine options and top-level error types.

use std::io;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

////////////////////////////////////////////////////////////////////////////////
// #region EnumsInit

/// Explicit classification of a pattern's `to` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnumAssetToType {
    /// `to` names a directory; the source base name is appended.
    Dir,
    /// `to` names the destination file itself.
    File,
}

/// Pattern matching mode for the ignore list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumAssetPatternMode {
    /// Shell-like wildcards, base-name aware (`*.tmp` matches `a/b.tmp`).
    Glob,
    /// Regular expression searched anywhere in the relative path.
    Regex,
    /// Relative path contains the literal string.
    Literal,
}

/// Coarse error category, used by callers to separate setup from batch failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumCopyAssetsErrorKind {
    /// Malformed pattern list or ignore list; fatal to setup.
    Config,
    /// Stat, read or enumeration failure against a declared source.
    Io,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region StructsAndErrors

/// One user-declared copy rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SpecAssetPattern {
    /// Source path, relative to the engine base directory.
    pub from: String,
    /// Destination path in the output set. Empty means "source base name".
    #[serde(default)]
    pub to: String,
    /// Overrides the extension-based file/directory inference for `to`.
    #[serde(default, rename = "toType")]
    pub to_type: Option<EnumAssetToType>,
    /// Always overwrite, ignoring existing entries and staleness.
    #[serde(default)]
    pub force: bool,
}

impl SpecAssetPattern {
    /// Pattern copying `from` into `to` with inferred classification.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            ..Self::default()
        }
    }

    /// Same pattern with an explicit `to` classification.
    pub fn with_to_type(mut self, to_type: EnumAssetToType) -> Self {
        self.to_type = Some(to_type);
        self
    }

    /// Same pattern with the force flag set.
    pub fn with_force(mut self, if_force: bool) -> Self {
        self.force = if_force;
        self
    }
}

/// Engine options for [`crate::CopyAssets`].
#[derive(Debug, Clone)]
pub struct SpecCopyAssetsOptions {
    /// Patterns applied to every candidate relative source path.
    pub patterns_ignore: Option<Vec<String>>,
    /// Interpretation of `patterns_ignore`.
    pub rule_pattern: EnumAssetPatternMode,
    /// Maximum worker threads used for files of one directory walk.
    pub num_workers_max: Option<usize>,
}

impl Default for SpecCopyAssetsOptions {
    fn default() -> Self {
        Self {
            patterns_ignore: None,
            rule_pattern: EnumAssetPatternMode::Glob,
            num_workers_max: None,
        }
    }
}

/// Errors raised while configuring the engine or running a batch.
#[derive(Debug, Error)]
pub enum CopyAssetsError {
    /// Pattern list has the wrong shape (e.g. not an array).
    #[error("Invalid asset pattern list: {0}")]
    InvalidPatternList(String),
    /// Pattern list could not be decoded.
    #[error("Failed to decode asset pattern list")]
    PatternListDecode(#[from] serde_json::Error),
    /// Ignore pattern failed to compile.
    #[error("Invalid ignore pattern `{pattern}`: {message}")]
    InvalidPattern {
        /// Raw pattern text.
        pattern: String,
        /// Compiler error text.
        message: String,
    },
    /// Pattern declared without a source path.
    #[error("Asset pattern #{index} has an empty `from`")]
    EmptySource {
        /// Position of the pattern in the declared list.
        index: usize,
    },
    /// Source metadata could not be read.
    #[error("Failed to stat {}", path.display())]
    Stat {
        /// Source path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Source directory could not be enumerated.
    #[error("Failed to read directory {}", path.display())]
    ReadDir {
        /// Directory path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

impl CopyAssetsError {
    /// Category of this error.
    pub fn kind(&self) -> EnumCopyAssetsErrorKind {
        match self {
            Self::InvalidPatternList(_)
            | Self::PatternListDecode(_)
            | Self::InvalidPattern { .. }
            | Self::EmptySource { .. } => EnumCopyAssetsErrorKind::Config,
            Self::Stat { .. } | Self::ReadDir { .. } => EnumCopyAssetsErrorKind::Io,
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region PatternListParsing

/// Decode a JSON pattern list.
///
/// `null` is accepted as "no patterns". Anything that is not an array of
/// pattern objects, or a pattern with an empty `from`, is a config error.
pub fn parse_asset_patterns_json(raw: &str) -> Result<Vec<SpecAssetPattern>, CopyAssetsError> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    let l_patterns: Vec<SpecAssetPattern> = match value {
        serde_json::Value::Null => Vec::new(),
        serde_json::Value::Array(_) => serde_json::from_value(value)?,
        _ => {
            return Err(CopyAssetsError::InvalidPatternList(
                "patterns must be an array".to_string(),
            ));
        }
    };
    validate_asset_patterns(&l_patterns)?;
    Ok(l_patterns)
}

pub(crate) fn validate_asset_patterns(
    patterns: &[SpecAssetPattern],
) -> Result<(), CopyAssetsError> {
    match patterns.iter().position(|p| p.from.is_empty()) {
        Some(index) => Err(CopyAssetsError::EmptySource { index }),
        None => Ok(()),
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
