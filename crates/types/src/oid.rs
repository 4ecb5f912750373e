use crate::urn::strip_urn_prefix;

/// Errors raised when parsing an object identifier.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum OidError {
    #[error("OID cannot be empty")]
    Empty,
    #[error("invalid OID '{0}': expected dot-separated decimal arcs")]
    Malformed(String),
}

/// An ISO object identifier such as `2.16.840.1.113883.3.787.0.0`.
///
/// Home-community ids arrive both bare and wrapped (`urn:oid:1.2.3`); the wrapper accepts either
/// and stores the bare form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Oid(String);

impl Oid {
    /// Parse an OID, accepting an optional `urn:oid:` prefix.
    ///
    /// # Errors
    ///
    /// Returns `OidError::Empty` for blank input and `OidError::Malformed` when any arc is not a
    /// non-empty run of ASCII digits, or there are fewer than two arcs.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, OidError> {
        let bare = strip_urn_prefix(input.as_ref().trim());
        if bare.is_empty() {
            return Err(OidError::Empty);
        }

        let arcs: Vec<&str> = bare.split('.').collect();
        let well_formed = arcs.len() >= 2
            && arcs
                .iter()
                .all(|arc| !arc.is_empty() && arc.bytes().all(|b| b.is_ascii_digit()));
        if !well_formed {
            return Err(OidError::Malformed(bare.to_owned()));
        }

        Ok(Self(bare.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `urn:oid:`-wrapped form used in SAML attributes and XCA slots.
    pub fn to_urn(&self) -> String {
        format!("urn:oid:{}", self.0)
    }
}

impl std::fmt::Display for Oid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Oid {
    type Err = OidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for Oid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for Oid {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for Oid {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Oid::parse(&s).map_err(serde::de::Error::custom)
    }
}
