//! External module resolution.
//!
//! Required modules that are neither declared in the project nor provided by
//! the platform are located through the project's locator chain and fetched
//! into the external module directory. Fetched archives may require further
//! modules, so resolution iterates until nothing is missing.

pub mod errors;
pub mod resolve;

pub use errors::ResolveError;
pub use resolve::{missing, ModuleResolver, Resolution};
