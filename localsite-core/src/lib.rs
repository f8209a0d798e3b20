//! localsite Core - Shared model types
//!
//! This crate contains the model types shared between the reconciliation
//! engine, the state-file host backend and the CLI's JSON output.
//!
//! All behavior (hosts editing, certificate rationalization, site
//! convergence, backends) lives in the `localsite` crate.

mod model;
mod report;

pub use model::*;
pub use report::*;
