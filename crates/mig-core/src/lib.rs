//! MIG Core - shared migration data model
//!
//! Types passed between the planner, the structure planner, the
//! transformation engine and the orchestrator:
//! - [`MigrationSpecification`] and its source/target configurations
//! - [`RepositoryFile`] as delivered by a repository fetcher
//! - [`TransformResult`] per migrated file
//! - [`FileStructureChange`] per planned relocation
//!
//! # Example
//!
//! ```rust,ignore
//! use mig_core::prelude::*;
//!
//! let spec: MigrationSpecification = serde_json::from_str(&json)?;
//! spec.validate()?;
//! println!("{}", spec.label());
//! ```

#![warn(unreachable_pub)]

pub mod error;
pub mod layout;
pub mod result;
pub mod spec;

pub use error::SpecError;
pub use layout::{
    FileStructureChange, FileType, LayoutConvention, StructureAction, StructureMetadata,
};
pub use result::{
    EntryKind, RepositoryFile, TransformMetadata, TransformResult, DEFAULT_REVIEW_THRESHOLD,
};
pub use spec::{
    ExportStyle, Language, MappingTables, MigrationSpecification, NamingConvention, Rule,
    RoutingModel, RuleSets, SourceConfig, SpecMetadata, TargetConfig,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the migration data model
    pub use crate::{
        FileStructureChange, FileType, LayoutConvention, MigrationSpecification, RepositoryFile,
        StructureAction, TransformResult,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
