//! Module sources.
//!
//! Transports fetch module archives and index files from remote or local
//! locations.

pub mod transport;

pub use transport::{HttpTransport, Transport, TransportError};
