//! taxon-common — shared entity shapes, the error taxonomy, and ID
//! sanitization used across the whole workspace.

pub mod error;
pub mod model;
pub mod sanitize;

pub use error::{Error, Result};
