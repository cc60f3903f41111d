//! Core data structures for Sonata.
//!
//! This module contains the foundational types used throughout Sonata:
//! - Module descriptors and declared modules
//! - Code spaces and the project model
//! - External module locators

pub mod descriptor;
pub mod locator;
pub mod module;
pub mod project;
pub mod project_builder;
pub mod space;

pub use descriptor::{ModuleDescriptor, Requires};
pub use locator::{Locator, LocatorChain, Stability};
pub use module::{DeclaredModule, SourceFolder};
pub use project::{Folders, Project};
pub use project_builder::{ProjectBuilder, ProjectError};
pub use space::Space;
