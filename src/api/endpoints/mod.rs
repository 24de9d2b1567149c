//! API endpoint handlers.

pub mod analyze;
pub mod emr;
pub mod health;
