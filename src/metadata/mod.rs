//! Object metadata.
//!
//! Queries are validated against the objects, fields and relationships a
//! [`MetadataProvider`] exposes. [`StaticMetadata`] keeps everything in
//! memory and can be loaded from TOML or JSON:
//!
//! ```toml
//! [[objects]]
//! name = "Contact"
//! table = "contacts"
//!
//! [[objects.fields]]
//! name = "LastName"
//! type = "string"
//! column = "last_name"
//!
//! [[objects.lookups]]
//! name = "Account"
//! field = "AccountId"
//! targets = ["Account"]
//! ```

mod provider;
mod types;

pub use provider::{MetadataError, MetadataProvider, StaticMetadata};
pub use types::*;
