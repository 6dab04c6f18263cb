//! Managed value decoding
//!
//! Maps metadata type names onto Rust representations and decodes the
//! runtime's string, array and list object layouts.

mod objects;
mod value;

pub use objects::{read_array, read_list, read_string, MAX_ELEMENTS, MAX_STRING_LEN};
pub use value::{FieldValue, ValueKind};
