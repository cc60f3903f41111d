//! Sonata - a build tool for modular Java projects
//!
//! This crate provides the core library functionality for Sonata,
//! including project scanning, external module resolution, and the
//! tool-driven build pipeline.

pub mod builder;
pub mod core;
pub mod ops;
pub mod resolver;
pub mod sources;
pub mod util;

/// Test utilities and fakes for Sonata unit tests.
///
/// This module is only available when compiling with `--cfg test` or
/// running tests. It provides scripted tool providers, an in-memory
/// transport and archive fixtures.
#[cfg(test)]
pub mod test_support;

pub use core::{ModuleDescriptor, Project};
pub use resolver::ModuleResolver;
pub use util::context::GlobalContext;
