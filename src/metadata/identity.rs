//! Assembly identity and strong-name tokens.
//!
//! Modules and assembly references both carry an [`AssemblyIdentity`]. The rewriter compares
//! identities by their display name (`Name, Version=a.b.c.d, Culture=neutral, PublicKeyToken=...`)
//! when it decides whether an assembly reference already exists, and rewrites the version and
//! token components when it aligns references with the framework they resolve to.
//!
//! # Public key tokens
//!
//! A token is the last eight bytes of the SHA-1 hash of the public key, reversed. Identities
//! that only carry a full public key compute their token on demand through
//! [`AssemblyIdentity::public_key_token`].

use std::fmt::{self, Write};
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha1::{Digest, Sha1};

use crate::{Error, Result};

/// Four-part version numbering for .NET assemblies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct AssemblyVersion {
    /// Major version component
    pub major: u16,
    /// Minor version component
    pub minor: u16,
    /// Build version component
    pub build: u16,
    /// Revision version component
    pub revision: u16,
}

impl AssemblyVersion {
    /// Create a version from its four components
    #[must_use]
    pub const fn new(major: u16, minor: u16, build: u16, revision: u16) -> Self {
        Self {
            major,
            minor,
            build,
            revision,
        }
    }

    /// Parse a dotted version string; missing trailing components default to zero.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if there are more than four components or one of
    /// them is not a 16-bit number.
    pub fn parse(version_str: &str) -> Result<Self> {
        let parts: Vec<&str> = version_str.split('.').collect();

        if parts.is_empty() || parts.len() > 4 {
            return Err(malformed_error!("Invalid version format: {}", version_str));
        }

        let mut components = [0u16; 4];
        for (i, part) in parts.iter().enumerate() {
            components[i] = part
                .parse::<u16>()
                .map_err(|_| malformed_error!("Invalid version component: {}", part))?;
        }

        Ok(Self::new(
            components[0],
            components[1],
            components[2],
            components[3],
        ))
    }
}

impl fmt::Display for AssemblyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

impl FromStr for AssemblyVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for AssemblyVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AssemblyVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(de::Error::custom)
    }
}

/// Identity of an assembly, used both for a module's own manifest and for its references.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AssemblyIdentity {
    /// Simple assembly name (e.g. `mscorlib`)
    pub name: String,
    /// Four-part version
    #[serde(default)]
    pub version: AssemblyVersion,
    /// Culture, `None` for culture-neutral assemblies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub culture: Option<String>,
    /// Full public key; empty when the assembly is not strong named
    #[serde(default, with = "hex_bytes", skip_serializing_if = "Vec::is_empty")]
    pub public_key: Vec<u8>,
    /// Eight byte public key token; empty when absent
    #[serde(default, with = "hex_bytes", skip_serializing_if = "Vec::is_empty")]
    pub public_key_token: Vec<u8>,
    /// Reference targets a Windows Runtime metadata file (`.winmd`)
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub windows_runtime: bool,
}

impl AssemblyIdentity {
    /// Create a culture-neutral identity without a strong name
    pub fn new(name: impl Into<String>, version: AssemblyVersion) -> Self {
        AssemblyIdentity {
            name: name.into(),
            version,
            ..Default::default()
        }
    }

    /// Parse a display name such as
    /// `mscorlib, Version=4.0.0.0, Culture=neutral, PublicKeyToken=b77a5c561934e089`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for an empty name, a bad version or a token that is
    /// not eight hex-encoded bytes.
    pub fn parse(display_name: &str) -> Result<Self> {
        let mut parts = display_name.split(',').map(str::trim);

        let name = parts.next().unwrap_or_default().to_string();
        if name.is_empty() {
            return Err(malformed_error!("Assembly name cannot be empty"));
        }

        let mut identity = AssemblyIdentity::new(name, AssemblyVersion::default());
        for part in parts {
            if let Some(value) = part.strip_prefix("Version=") {
                identity.version = AssemblyVersion::parse(value)?;
            } else if let Some(value) = part.strip_prefix("Culture=") {
                if value != "neutral" {
                    identity.culture = Some(value.to_string());
                }
            } else if let Some(value) = part.strip_prefix("PublicKeyToken=") {
                if value != "null" && !value.is_empty() {
                    let token = hex_bytes::decode(value)
                        .ok_or_else(|| malformed_error!("Invalid PublicKeyToken '{}'", value))?;
                    if token.len() != 8 {
                        return Err(malformed_error!(
                            "PublicKeyToken must be exactly 8 bytes, got {} from '{}'",
                            token.len(),
                            value
                        ));
                    }
                    identity.public_key_token = token;
                }
            }
        }

        Ok(identity)
    }

    /// Returns true if the identity carries a public key
    #[must_use]
    pub fn has_public_key(&self) -> bool {
        !self.public_key.is_empty()
    }

    /// The public key token: the explicit token if present, otherwise derived from the
    /// public key. Empty if the identity has neither.
    #[must_use]
    pub fn public_key_token(&self) -> Vec<u8> {
        if !self.public_key_token.is_empty() {
            return self.public_key_token.clone();
        }
        if self.public_key.is_empty() {
            return Vec::new();
        }

        let hash = Sha1::digest(&self.public_key);
        hash[hash.len() - 8..].iter().rev().copied().collect()
    }

    /// The display name used to compare identities
    #[must_use]
    pub fn full_name(&self) -> String {
        let mut result = String::with_capacity(self.name.len() + 80);
        result.push_str(&self.name);

        let _ = write!(result, ", Version={}", self.version);
        let _ = write!(
            result,
            ", Culture={}",
            self.culture.as_deref().unwrap_or("neutral")
        );

        result.push_str(", PublicKeyToken=");
        let token = self.public_key_token();
        if token.is_empty() {
            result.push_str("null");
        } else {
            result.push_str(&hex_bytes::encode(&token));
        }

        result
    }

    /// Identity to use when referencing this assembly from another module
    #[must_use]
    pub fn to_reference(&self) -> AssemblyIdentity {
        AssemblyIdentity {
            name: self.name.clone(),
            version: self.version,
            culture: self.culture.clone(),
            public_key: Vec::new(),
            public_key_token: self.public_key_token(),
            windows_runtime: self.windows_runtime,
        }
    }
}

impl fmt::Display for AssemblyIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_name())
    }
}

impl FromStr for AssemblyIdentity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

mod hex_bytes {
    use std::fmt::Write;

    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn encode(bytes: &[u8]) -> String {
        bytes.iter().fold(String::new(), |mut out, byte| {
            let _ = write!(out, "{byte:02x}");
            out
        })
    }

    pub fn decode(text: &str) -> Option<Vec<u8>> {
        if text.len() % 2 != 0 {
            return None;
        }
        (0..text.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(text.get(i..i + 2)?, 16).ok())
            .collect()
    }

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        decode(&text).ok_or_else(|| de::Error::custom(format!("'{text}' is not hex encoded")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parse_and_display() {
        let version = AssemblyVersion::parse("4.0").unwrap();
        assert_eq!(version, AssemblyVersion::new(4, 0, 0, 0));
        assert_eq!(version.to_string(), "4.0.0.0");

        assert!(AssemblyVersion::parse("1.2.3.4.5").is_err());
        assert!(AssemblyVersion::parse("1.x").is_err());
    }

    #[test]
    fn test_identity_parse_full_name() {
        let name = "mscorlib, Version=4.0.0.0, Culture=neutral, PublicKeyToken=b77a5c561934e089";
        let identity = AssemblyIdentity::parse(name).unwrap();

        assert_eq!(identity.name, "mscorlib");
        assert_eq!(identity.version, AssemblyVersion::new(4, 0, 0, 0));
        assert!(identity.culture.is_none());
        assert_eq!(
            identity.public_key_token,
            vec![0xb7, 0x7a, 0x5c, 0x56, 0x19, 0x34, 0xe0, 0x89]
        );
        assert_eq!(identity.full_name(), name);
    }

    #[test]
    fn test_identity_without_token() {
        let identity = AssemblyIdentity::new("Support", AssemblyVersion::new(1, 0, 0, 0));
        assert_eq!(
            identity.full_name(),
            "Support, Version=1.0.0.0, Culture=neutral, PublicKeyToken=null"
        );
        assert!(AssemblyIdentity::parse("").is_err());
        assert!(AssemblyIdentity::parse("A, PublicKeyToken=abcd").is_err());
    }

    #[test]
    fn test_token_derived_from_public_key() {
        let mut identity = AssemblyIdentity::new("Signed", AssemblyVersion::new(1, 0, 0, 0));
        identity.public_key = vec![0x00, 0x24, 0x00, 0x00, 0x04, 0x80];

        let token = identity.public_key_token();
        assert_eq!(token.len(), 8);

        let reference = identity.to_reference();
        assert!(reference.public_key.is_empty());
        assert_eq!(reference.public_key_token, token);
        assert_eq!(reference.full_name(), identity.full_name());
    }

    #[test]
    fn test_identity_serde() {
        let identity = AssemblyIdentity::parse(
            "System.Runtime, Version=4.0.10.0, Culture=neutral, PublicKeyToken=b03f5f7f11d50a3a",
        )
        .unwrap();

        let json = serde_json::to_string(&identity).unwrap();
        assert!(json.contains("\"version\":\"4.0.10.0\""));
        assert!(json.contains("\"public_key_token\":\"b03f5f7f11d50a3a\""));

        let back: AssemblyIdentity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, identity);
    }
}
