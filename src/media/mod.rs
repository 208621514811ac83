//! Remote media hosting.
//!
//! The [`backend::MediaBackend`] trait abstracts over where image bytes
//! are published.  Implementations are a Cloudinary client and an
//! in-memory host for tests and offline runs.

pub mod backend;
pub mod cloudinary;
pub mod memory;
