//! C ABI surface

pub mod exports;

mod error;

pub(crate) use error::{clear_last_error, set_last_error};
pub use error::last_error;
