//! Layout, selection and viewport engine for asset dependency graphs.

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod graph;
pub mod ir;
pub mod layout;
pub mod layout_dump;
pub mod selection;
pub mod viewport;
pub mod visibility;
pub mod worker;

#[cfg(feature = "cli")]
pub use cli::run;
pub use graph::{GraphError, GraphModel};
pub use layout::{Layout, compute_layout};
