//! Metadata flag and token constants (ECMA-335 partition II)

/// `FieldAttributes.Static`
pub const FIELD_ATTRIBUTE_STATIC: u32 = 0x0010;

/// `FieldAttributes.Literal` (const fields, no storage)
pub const FIELD_ATTRIBUTE_LITERAL: u32 = 0x0040;

/// `MethodAttributes.Static`
pub const METHOD_ATTRIBUTE_STATIC: u32 = 0x0010;

/// `MethodAttributes.Virtual`
pub const METHOD_ATTRIBUTE_VIRTUAL: u32 = 0x0040;

/// Metadata table index of the TypeDef table
pub const TABLE_TYPEDEF: i32 = 2;

/// Token prefix for TypeDef rows (`0x02 << 24`)
pub const TOKEN_TYPEDEF: u32 = 0x0200_0000;

/// Build a TypeDef token from a zero-based row index
///
/// Metadata rows are one-based; row 0 of the token space is reserved.
pub const fn typedef_token(row: u32) -> u32 {
    TOKEN_TYPEDEF | (row + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typedef_token() {
        assert_eq!(typedef_token(0), 0x0200_0001);
        assert_eq!(typedef_token(41), 0x0200_002A);
    }
}
