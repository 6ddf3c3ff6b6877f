//! Disk usage tree with incrementally maintained subtree statistics.
//!
//! [`tree::DirTree`] holds the scanned entries and their aggregated totals,
//! [`scan::Scanner`] fills it from the local filesystem.

#![allow(clippy::enum_variant_names)]

pub mod config;
pub mod ext;
pub mod scan;
pub mod tree;
