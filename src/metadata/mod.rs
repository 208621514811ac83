//! Metadata storage layer.
//!
//! The metadata store keeps user accounts and image records.  The
//! [`store::MetadataStore`] trait defines the interface;
//! [`sqlite::SqliteMetadataStore`] is the persistent implementation and
//! [`memory::MemoryMetadataStore`] the fallback.  [`mode::select_store`]
//! picks one at startup.

pub mod memory;
pub mod mode;
pub mod sqlite;
pub mod store;
