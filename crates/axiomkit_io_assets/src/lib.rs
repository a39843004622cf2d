//! `axiomkit_io_assets` v1:
//! Build-time asset copy engine.
//!
//! Resolves a declared list of `from -> to` patterns into an in-memory output
//! set of lazy byte sources, which the surrounding build flushes to disk.
//!
//! - `copy`   : batch orchestration, directory walk, asset writer
//! - `output` : output set and dependency record
//! - `spec`   : patterns/options/errors
//! - `report` : per-batch report model
//! - `util`   : ignore matching, destination resolution, staleness

pub mod copy;
pub mod output;
pub mod report;
pub mod spec;
mod util;

pub use copy::{CopyAssets, EnumAssetWriteOutcome, SpecBatchState};
pub use output::{AssetOutputSet, SpecAssetSource, SpecDependencyRecord};
pub use report::{ReportCopyAssets, ReportCopyAssetsBuilder};
pub use spec::{
    CopyAssetsError, EnumAssetPatternMode, EnumAssetToType, EnumCopyAssetsErrorKind,
    SpecAssetPattern, SpecCopyAssetsOptions, parse_asset_patterns_json,
};
pub use util::{SpecIgnorePatterns, derive_walked_destination, resolve_destination, should_write};
