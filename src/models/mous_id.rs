use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{AppError, AppResult};

const DATABASE_PREFIX: &str = "uid://";
const FILESYSTEM_PREFIX: &str = "uid___";

/// Identifier of one member observing unit set.
///
/// Two textual encodings exist: the database form `uid://A001/X123/Xabc`
/// and the filesystem-safe form `uid___A001_X123_Xabc`. Both carry the same
/// three non-empty components. A component may not contain either form's
/// separator (`/`, `_`), a `:` or whitespace, so conversion is lossless either way.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MousId {
    parts: [String; 3],
}

impl MousId {
    /// Parse either encoding. Surrounding whitespace is ignored.
    pub fn parse(raw: &str) -> AppResult<Self> {
        let trimmed = raw.trim();

        let (core, separator) = if let Some(core) = trimmed.strip_prefix(DATABASE_PREFIX) {
            (core, '/')
        } else if let Some(core) = trimmed.strip_prefix(FILESYSTEM_PREFIX) {
            (core, '_')
        } else {
            return Err(AppError::InvalidMousId(format!("Cannot interpret MOUS ID: {}", raw)));
        };

        let pieces: Vec<&str> = core.split(separator).collect();
        let [a, b, c] = pieces.as_slice() else {
            return Err(AppError::InvalidMousId(format!(
                "Expected 3 components in {}, found {}",
                raw,
                pieces.len()
            )));
        };

        for piece in [a, b, c] {
            if piece.is_empty() || piece.chars().any(is_reserved) {
                return Err(AppError::InvalidMousId(format!("Invalid component '{}' in {}", piece, raw)));
            }
        }

        Ok(Self {
            parts: [a.to_string(), b.to_string(), c.to_string()],
        })
    }

    /// `uid://A001/X123/Xabc`
    pub fn database_form(&self) -> String {
        format!("{}{}", DATABASE_PREFIX, self.parts.join("/"))
    }

    /// `uid___A001_X123_Xabc`
    pub fn filesystem_form(&self) -> String {
        format!("{}{}", FILESYSTEM_PREFIX, self.parts.join("_"))
    }
}

fn is_reserved(ch: char) -> bool {
    matches!(ch, '/' | '_' | ':') || ch.is_whitespace() || ch.is_control()
}

/// Convert an ID in either encoding to the database form.
pub fn to_database_form(raw: &str) -> AppResult<String> {
    MousId::parse(raw).map(|id| id.database_form())
}

/// Convert an ID in either encoding to the filesystem-safe form.
pub fn to_filesystem_form(raw: &str) -> AppResult<String> {
    MousId::parse(raw).map(|id| id.filesystem_form())
}

impl fmt::Display for MousId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.database_form())
    }
}

impl FromStr for MousId {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for MousId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.database_form())
    }
}

impl<'de> Deserialize<'de> for MousId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        MousId::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_conversions() {
        assert_eq!(to_filesystem_form("uid://A001/X123/Xabc").unwrap(), "uid___A001_X123_Xabc");
        assert_eq!(to_database_form("uid___A001_X123_Xabc").unwrap(), "uid://A001/X123/Xabc");
        assert_eq!(to_database_form("  uid://A001/X123/Xabc\n").unwrap(), "uid://A001/X123/Xabc");
    }

    #[test]
    fn test_malformed_ids_are_rejected() {
        for bad in [
            "",
            "A001/X123/Xabc",
            "uid://A001/X123",
            "uid://A001/X123/Xabc/extra",
            "uid___A001_X123",
            "uid___A001_X1_23_X4",
            "uid://A001//Xabc",
            "uid://A0 1/X123/Xabc",
            "uid://A001/X1_2/Xabc",
            "uid://A001/X1:2/Xabc",
        ] {
            assert!(
                matches!(to_database_form(bad), Err(AppError::InvalidMousId(_))),
                "accepted {:?}",
                bad
            );
            assert!(matches!(to_filesystem_form(bad), Err(AppError::InvalidMousId(_))));
        }
    }

    #[test]
    fn test_non_alphanumeric_components_are_accepted() {
        assert_eq!(to_filesystem_form("uid://A001/X1.2/X-3a").unwrap(), "uid___A001_X1.2_X-3a");
        assert_eq!(to_database_form("uid___A001_X1.2_X-3a").unwrap(), "uid://A001/X1.2/X-3a");
        assert_eq!(to_database_form("uid://a001/x1ée/X+3").unwrap(), "uid://a001/x1ée/X+3");
    }

    #[test]
    fn test_serde_uses_database_form() {
        let id: MousId = serde_json::from_str("\"uid___A002_Xb1_X2\"").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"uid://A002/Xb1/X2\"");
    }

    fn component() -> impl Strategy<Value = String> {
        "[A-Za-z0-9.+-]{1,8}"
    }

    proptest! {
        #[test]
        fn prop_round_trip_between_forms(a in component(), b in component(), c in component()) {
            let db = format!("uid://{}/{}/{}", a, b, c);
            let fs = format!("uid___{}_{}_{}", a, b, c);

            prop_assert_eq!(to_filesystem_form(&to_database_form(&fs).unwrap()).unwrap(), to_filesystem_form(&fs).unwrap());
            prop_assert_eq!(to_database_form(&to_filesystem_form(&db).unwrap()).unwrap(), to_database_form(&db).unwrap());
            // already in the target form
            prop_assert_eq!(to_database_form(&db).unwrap(), db.clone());
            prop_assert_eq!(to_filesystem_form(&fs).unwrap(), fs.clone());
        }

        #[test]
        fn prop_unprefixed_strings_are_rejected(raw in "[^u\\s].{0,30}") {
            prop_assert!(to_database_form(&raw).is_err());
            prop_assert!(to_filesystem_form(&raw).is_err());
        }
    }
}
