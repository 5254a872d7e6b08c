//! Request extractors shared by the handlers.

pub mod query;
pub mod user;
