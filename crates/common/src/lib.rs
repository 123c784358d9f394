//! Shared types for the app platform portal workspace.
//!
//! Keep wire-level documents exchanged with the platform API here so the
//! engine and any outer surface agree on a single shape.

#![warn(missing_docs)]

/// Platform API documents (applications, specs, deployments).
pub mod api;
