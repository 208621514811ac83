//! Gallery API request handlers.

pub mod auth;
pub mod images;
