//! MIG Layout - file structure planner
//!
//! Maps a source tree onto the directory convention of the target framework:
//! - [`route`] parses route files into a convention-independent form and renders them back
//! - [`classify`] assigns a [`mig_core::FileType`] to every file
//! - [`planner`] produces ordered [`mig_core::FileStructureChange`] lists
//!
//! # Example
//!
//! ```rust,ignore
//! use mig_layout::plan_structure_changes;
//!
//! for change in plan_structure_changes(&files, &spec) {
//!     println!("{:?} {} -> {}", change.action, change.original_path, change.new_path);
//! }
//! ```

#![warn(unreachable_pub)]

pub mod classify;
pub mod error;
pub mod planner;
pub mod route;

pub use classify::{classify, ContentSignals};
pub use error::LayoutError;
pub use planner::{plan_structure_changes, sort_changes, StructurePlanner};
pub use route::{parse_route, render_route, RenderExt, RouteFile, RouteRole, Segment};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for structure planning
    pub use crate::{plan_structure_changes, LayoutError, StructurePlanner};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
