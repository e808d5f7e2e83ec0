//! `mh-registry` - the synchronous boundary between the model handle service
//! and an out-of-process inference backend.
//!
//! This crate provides:
//! - A `Transport` trait carrying `{data, error}` envelopes
//! - `Params`, a flat mapping of primitive values sent with every call
//! - Arena-style `Handle` values naming backend-held resources
//! - A `ResourceRegistry` that acquires, looks up and releases handles

pub mod error;
pub mod handle;
pub mod params;
pub mod registry;
pub mod transport;

pub use error::{BackendError, RegistryError, Result, SerializationError};
pub use handle::{Handle, ResourceKind};
pub use params::Params;
pub use registry::{Acquired, ResourceRegistry};
pub use transport::{method, Envelope, Transport};
