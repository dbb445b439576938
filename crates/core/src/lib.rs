//! # Assets Core
//!
//! File identity resolution and the two-filesystem asset store.
//!
//! This crate contains:
//! - [`FileResolutionStrategy`]: finds a tuple on disk across naming schemes, resolves stale
//!   file IDs, and enumerates variants lazily
//! - [`AssetStore`]: writes with conflict handling, visibility moves, rename/copy/delete,
//!   session grants, and the HTTP-facing [`AssetStore::get_response_for`]
//! - The record-store boundary used for soft resolution and migration
//!
//! **No transport concerns**: HTTP servers and command lines belong in `api-rest` and `cli`.

pub mod config;
pub mod constants;
pub mod error;
pub mod grants;
pub mod migration;
pub mod name_generator;
pub mod records;
pub mod response;
pub mod store;
pub mod strategy;

pub use config::{assets_config_from_env, AssetsConfig, SchemeConfig};
pub use error::{AssetError, AssetResult};
pub use grants::{GrantStore, InMemoryGrantStore, SessionId};
pub use migration::{FileMigrationHelper, LegacyThumbnailMigrationHelper, MigrationReport};
pub use name_generator::AssetNameGenerator;
pub use records::{FileRecord, InMemoryRecordStore, RecordStore, RecordVersion};
pub use response::{AssetResponse, ResponseBody};
pub use store::{
    mime_from_extension, AssetMetadata, AssetStore, NormaliseOutcome, StoreCapabilities,
    WriteConfig,
};
pub use strategy::{FileResolutionStrategy, VariantIter};

pub use assets_fileid::{FileIdScheme, ParsedFileId};
pub use assets_types::{AssetTuple, ConflictResolution, Stage, Visibility};
