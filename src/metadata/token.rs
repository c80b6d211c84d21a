use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use strum::{Display, EnumIter};

/// The metadata tables a [`Token`] can address inside a [`crate::metadata::module::Module`].
///
/// The discriminants are the ECMA-335 table numbers, so the high byte of a token built by
/// [`Token::from_parts`] matches what a binary module would carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[repr(u8)]
pub enum TableId {
    /// `TypeRef` - references to types defined in other modules
    TypeRef = 0x01,
    /// `TypeDef` - types defined in this module
    TypeDef = 0x02,
    /// `Field` - field definitions
    Field = 0x04,
    /// `MethodDef` - method definitions
    MethodDef = 0x06,
    /// `MemberRef` - references to fields and methods of other types
    MemberRef = 0x0A,
    /// `TypeSpec` - constructed type signatures
    TypeSpec = 0x1B,
    /// `AssemblyRef` - references to other assemblies
    AssemblyRef = 0x23,
    /// `MethodSpec` - generic method instantiations
    MethodSpec = 0x2B,
}

impl TableId {
    /// Maps a raw table byte back to a [`TableId`], if the table is modelled
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(TableId::TypeRef),
            0x02 => Some(TableId::TypeDef),
            0x04 => Some(TableId::Field),
            0x06 => Some(TableId::MethodDef),
            0x0A => Some(TableId::MemberRef),
            0x1B => Some(TableId::TypeSpec),
            0x23 => Some(TableId::AssemblyRef),
            0x2B => Some(TableId::MethodSpec),
            _ => None,
        }
    }
}

/// A metadata token representing a reference to a metadata table entry.
///
/// Tokens in .NET metadata consist of a 32-bit value where:
/// - The high byte (bits 24-31) indicates the table type
/// - The low 24 bits (bits 0-23) indicate the row index within that table
///
/// Rows are 1-based; row `n` of a table lives at index `n - 1` of the matching
/// [`crate::metadata::module::Module`] vector.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Token(pub u32);

impl Token {
    /// Creates a new token from a raw 32-bit value
    #[must_use]
    pub fn new(value: u32) -> Self {
        Token(value)
    }

    /// Creates a token for `row` (1-based) of `table`
    #[must_use]
    pub fn from_parts(table: TableId, row: u32) -> Self {
        Token((u32::from(table as u8) << 24) | (row & 0x00FF_FFFF))
    }

    /// Creates a token for the element at `index` (0-based) of `table`
    #[must_use]
    pub fn from_index(table: TableId, index: usize) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        Self::from_parts(table, index as u32 + 1)
    }

    /// Returns the raw token value
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Extracts the table type from the token (high byte)
    #[must_use]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Returns the table this token addresses, if it is one of the modelled tables
    #[must_use]
    pub fn table_id(&self) -> Option<TableId> {
        TableId::from_u8(self.table())
    }

    /// Returns true if the token addresses `table`
    #[must_use]
    pub fn is_table(&self, table: TableId) -> bool {
        self.table() == table as u8
    }

    /// Extracts the row index from the token (low 24 bits)
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// Returns the 0-based vector index of the row, `None` for row 0
    #[must_use]
    pub fn index(&self) -> Option<usize> {
        (self.row() as usize).checked_sub(1)
    }

    /// Returns true if this is a null token (value 0)
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl From<Token> for u32 {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(0x{:08x}, table: 0x{:02x}, row: {})",
            self.0,
            self.table(),
            self.row()
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl Serialize for Token {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Token {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        let hex = text
            .strip_prefix("0x")
            .or_else(|| text.strip_prefix("0X"))
            .ok_or_else(|| de::Error::custom(format!("token '{text}' is not hex prefixed")))?;
        u32::from_str_radix(hex, 16)
            .map(Token)
            .map_err(|_| de::Error::custom(format!("token '{text}' is not a valid hex value")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_token_from_parts() {
        let token = Token::from_parts(TableId::MethodDef, 1);
        assert_eq!(token.value(), 0x06000001);
        assert_eq!(token.table_id(), Some(TableId::MethodDef));
        assert!(token.is_table(TableId::MethodDef));
        assert!(!token.is_table(TableId::MemberRef));
    }

    #[test]
    fn test_token_index() {
        let token = Token::from_index(TableId::TypeRef, 4);
        assert_eq!(token.row(), 5);
        assert_eq!(token.index(), Some(4));

        assert_eq!(Token::new(0x01000000).index(), None);
    }

    #[test]
    fn test_token_is_null() {
        assert!(Token(0).is_null());
        assert!(!Token(0x02000001).is_null());
    }

    #[test]
    fn test_token_display_and_debug() {
        let token = Token(0x0A00002B);
        assert_eq!(format!("{token}"), "0x0a00002b");
        assert_eq!(
            format!("{token:?}"),
            "Token(0x0a00002b, table: 0x0a, row: 43)"
        );
    }

    #[test]
    fn test_token_serde() {
        let token = Token::from_parts(TableId::AssemblyRef, 2);
        let json = serde_json::to_string(&token).unwrap();
        assert_eq!(json, "\"0x23000002\"");

        let back: Token = serde_json::from_str(&json).unwrap();
        assert_eq!(back, token);

        assert!(serde_json::from_str::<Token>("\"23000002\"").is_err());
        assert!(serde_json::from_str::<Token>("\"0xZZ\"").is_err());
    }

    #[test]
    fn test_token_as_map_key() {
        let mut map = HashMap::new();
        map.insert(Token(0x02000001), "first");
        map.insert(Token(0x02000002), "second");

        assert_eq!(map.get(&Token(0x02000001)), Some(&"first"));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_table_id_roundtrip() {
        use strum::IntoEnumIterator;

        for table in TableId::iter() {
            assert_eq!(TableId::from_u8(table as u8), Some(table));
        }
        assert_eq!(TableId::from_u8(0x20), None);
    }
}
