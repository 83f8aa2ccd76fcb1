//! Identifiers and primitive storage kinds.
//!
//! `Uid` is a 128-bit identifier wrapped as a typed struct with explicit
//! `decode`/`encode`-style conversions at the disk boundary, the same shape
//! as other newtype identifiers in this crate. It wraps the `uuid` crate
//! rather than hand-rolling UUID parsing and formatting.

use uuid::Uuid;

use crate::error::{ModelError, Result};

/// 128-bit identifier shared by every entity and every entity type.
///
/// Equality is bitwise (`derive(PartialEq, Eq, Hash)` on the wrapped
/// `Uuid`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uid(Uuid);

impl Uid {
    /// Generate a fresh random identifier, as used when an entity or type
    /// is created in memory without a file-provided uid.
    pub fn new_v4() -> Self {
        Uid(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Uid(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Parse the on-disk form `"{xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx}"`.
    /// Braces are optional on input for leniency, but the writer always
    /// emits them.
    pub fn from_braced(text: &str) -> Result<Self> {
        let trimmed = text.trim().trim_start_matches('{').trim_end_matches('}');
        Uuid::parse_str(trimmed)
            .map(Uid)
            .map_err(|e| ModelError::Validation {
                what: "uid".to_string(),
                message: format!("invalid uid string {text:?}: {e}"),
            })
    }

    /// Render the on-disk braced form.
    pub fn to_braced(&self) -> String {
        format!("{{{}}}", self.0)
    }
}

impl std::fmt::Display for Uid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_braced())
    }
}

/// Tagged enumeration of storage-level value kinds.
///
/// Each variant dictates the on-disk dtype and no-data sentinel used by
/// `geoh5_model::entity::DataValues`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Invalid,
    Integer,
    Float,
    Text,
    Referenced,
    DateTime,
    Filename,
    Blob,
    Vector,
    DataTimeDelta,
    Boolean,
    Geometric,
    MultiText,
}

impl PrimitiveType {
    /// On-disk attribute value written as `"Primitive type"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            PrimitiveType::Invalid => "INVALID",
            PrimitiveType::Integer => "INTEGER",
            PrimitiveType::Float => "FLOAT",
            PrimitiveType::Text => "TEXT",
            PrimitiveType::Referenced => "REFERENCED",
            PrimitiveType::DateTime => "DATETIME",
            PrimitiveType::Filename => "FILENAME",
            PrimitiveType::Blob => "BLOB",
            PrimitiveType::Vector => "VECTOR",
            PrimitiveType::DataTimeDelta => "DATETIME_DELTA",
            PrimitiveType::Boolean => "BOOLEAN",
            PrimitiveType::Geometric => "GEOMETRIC",
            PrimitiveType::MultiText => "MULTI_TEXT",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        Some(match value {
            "INVALID" => PrimitiveType::Invalid,
            "INTEGER" => PrimitiveType::Integer,
            "FLOAT" => PrimitiveType::Float,
            "TEXT" => PrimitiveType::Text,
            "REFERENCED" => PrimitiveType::Referenced,
            "DATETIME" => PrimitiveType::DateTime,
            "FILENAME" => PrimitiveType::Filename,
            "BLOB" => PrimitiveType::Blob,
            "VECTOR" => PrimitiveType::Vector,
            "DATETIME_DELTA" => PrimitiveType::DataTimeDelta,
            "BOOLEAN" => PrimitiveType::Boolean,
            "GEOMETRIC" => PrimitiveType::Geometric,
            "MULTI_TEXT" => PrimitiveType::MultiText,
            _ => return None,
        })
    }
}

/// Which geometric element of a parent object a data value corresponds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Association {
    Object,
    Cell,
    Vertex,
    Face,
    Group,
    Depth,
}

impl Association {
    pub fn as_str(&self) -> &'static str {
        match self {
            Association::Object => "OBJECT",
            Association::Cell => "CELL",
            Association::Vertex => "VERTEX",
            Association::Face => "FACE",
            Association::Group => "GROUP",
            Association::Depth => "DEPTH",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        Some(match value {
            "OBJECT" => Association::Object,
            "CELL" => Association::Cell,
            "VERTEX" => Association::Vertex,
            "FACE" => Association::Face,
            "GROUP" => Association::Group,
            "DEPTH" => Association::Depth,
            _ => return None,
        })
    }
}

/// Decode `i8` 0/1 boolean storage.
pub fn decode_bool(raw: i8) -> bool {
    raw != 0
}

/// Encode a bool back to its `i8` 0/1 storage form.
pub fn encode_bool(value: bool) -> i8 {
    if value {
        1
    } else {
        0
    }
}

/// Decode a UTF-8 byte attribute to a string, passing already-decoded
/// strings through unchanged, matching `geoh5py`'s `as_str_if_utf8_bytes`.
pub fn decode_utf8_bytes(raw: &[u8]) -> Result<String> {
    std::str::from_utf8(raw)
        .map(|s| s.to_string())
        .map_err(|e| ModelError::Validation {
            what: "utf8".to_string(),
            message: format!("invalid utf-8 attribute bytes: {e}"),
        })
}

pub fn encode_utf8_bytes(value: &str) -> Vec<u8> {
    value.as_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uid_roundtrips_through_braced_string() {
        let uid = Uid::new_v4();
        let text = uid.to_braced();
        assert!(text.starts_with('{') && text.ends_with('}'));
        let parsed = Uid::from_braced(&text).unwrap();
        assert_eq!(uid, parsed);
    }

    #[test]
    fn uid_from_braced_tolerates_missing_braces() {
        let uid = Uid::new_v4();
        let bare = uid.as_uuid().to_string();
        let parsed = Uid::from_braced(&bare).unwrap();
        assert_eq!(uid, parsed);
    }

    #[test]
    fn uid_from_braced_rejects_garbage() {
        assert!(Uid::from_braced("not-a-uid").is_err());
    }

    #[test]
    fn primitive_type_round_trips_through_str() {
        for pt in [
            PrimitiveType::Integer,
            PrimitiveType::Float,
            PrimitiveType::Text,
            PrimitiveType::Referenced,
            PrimitiveType::Boolean,
            PrimitiveType::Vector,
        ] {
            let s = pt.as_str();
            assert_eq!(PrimitiveType::from_str(s), Some(pt));
        }
    }

    #[test]
    fn bool_storage_round_trips() {
        assert!(decode_bool(encode_bool(true)));
        assert!(!decode_bool(encode_bool(false)));
    }
}
