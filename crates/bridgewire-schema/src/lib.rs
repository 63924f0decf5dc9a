//! Message schema registry for bridge payloads.
//!
//! Maps typed records to the generic structured payloads carried in
//! `msg`/`args`/`values` fields and back, keyed by the message type name
//! (`package/Type`). JSON Schema 2020-12 validation per type name is
//! optional: types without a registered schema pass through unchecked
//! unless the registry is configured to fail on missing schemas.

pub mod config;
pub mod error;
pub mod message;
pub mod registry;
pub mod validator;

pub use config::RegistryConfig;
pub use error::{Result, SchemaError};
pub use message::BridgeMessage;
pub use registry::SchemaRegistry;
