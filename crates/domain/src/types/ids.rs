//! Subject identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::Result;
use crate::validation::sanitize_uuid;

/// Stable identifier of the entity a preference set belongs to.
///
/// Carried on the wire as 32 lowercase hex characters (a UUID with the
/// hyphens stripped). Construction always normalizes, so two ids compare
/// equal regardless of the input formatting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
    /// Parse an id from a hyphenated or bare UUID string.
    pub fn parse(raw: &str) -> Result<Self> {
        Ok(Self(sanitize_uuid(raw)?))
    }

    /// Build an id from a parsed UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid.simple().to_string())
    }

    /// The canonical wire form: 32 lowercase hex characters.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Uuid> for SubjectId {
    fn from(uuid: Uuid) -> Self {
        Self::from_uuid(uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PrefsError;

    #[test]
    fn parse_normalizes_formatting() {
        let a = SubjectId::parse("069A79F4-44E9-4726-A5BE-FCA90E38AAF5").expect("valid");
        let b = SubjectId::parse("069a79f444e94726a5befca90e38aaf5").expect("valid");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "069a79f444e94726a5befca90e38aaf5");
    }

    #[test]
    fn from_uuid_uses_simple_form() {
        let uuid = Uuid::new_v4();
        let id = SubjectId::from_uuid(uuid);
        assert_eq!(id.as_str(), uuid.simple().to_string());
        assert_eq!(id.as_str().len(), 32);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(SubjectId::parse("steve"), Err(PrefsError::InvalidUuid(_))));
    }
}
