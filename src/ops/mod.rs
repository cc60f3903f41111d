//! High-level operations.
//!
//! This module contains the implementation of Sonata actions.

pub mod sonata_build;
pub mod sonata_clean;

pub use sonata_build::{build, build_with};
pub use sonata_clean::{clean, CleanOptions};
