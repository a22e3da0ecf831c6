//! Composite `scope/local-id` handles used to name resources across the API.
//!
//! A handle pins a resource to the partition (usually a region) it was created
//! in, so every operation can route to the right remote endpoint without a
//! separate scope argument.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Character joining the scope and the local identifier.
pub const SEPARATOR: char = '/';

/// Errors raised when encoding or decoding a [`ResourceId`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum IdentifierError {
    /// Raised when the scope component is empty.
    #[error("identifier scope must not be empty")]
    EmptyScope,
    /// Raised when the scope component embeds the separator.
    #[error("identifier scope '{0}' must not contain '{SEPARATOR}'")]
    SeparatorInScope(String),
    /// Raised when the local component is empty.
    #[error("local identifier must not be empty")]
    EmptyLocalId,
    /// Raised when the local component embeds the separator.
    #[error("local identifier '{0}' must not contain '{SEPARATOR}'")]
    SeparatorInLocalId(String),
    /// Raised when a handle carries no separator at all.
    #[error("handle '{0}' is missing the '{SEPARATOR}' separator")]
    MissingSeparator(String),
}

/// A resource name scoped to the partition it lives in.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceId {
    scope: String,
    local_id: String,
}

impl ResourceId {
    /// Builds an identifier from its parts.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError`] when either part is empty or contains
    /// [`SEPARATOR`].
    pub fn new(
        scope: impl Into<String>,
        local_id: impl Into<String>,
    ) -> Result<Self, IdentifierError> {
        let scope_value = scope.into();
        let local_value = local_id.into();
        if scope_value.is_empty() {
            return Err(IdentifierError::EmptyScope);
        }
        if scope_value.contains(SEPARATOR) {
            return Err(IdentifierError::SeparatorInScope(scope_value));
        }
        if local_value.is_empty() {
            return Err(IdentifierError::EmptyLocalId);
        }
        if local_value.contains(SEPARATOR) {
            return Err(IdentifierError::SeparatorInLocalId(local_value));
        }
        Ok(Self {
            scope: scope_value,
            local_id: local_value,
        })
    }

    /// Encodes `scope` and `local_id` into a single handle string.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError`] under the same rules as [`Self::new`].
    pub fn encode(
        scope: impl Into<String>,
        local_id: impl Into<String>,
    ) -> Result<String, IdentifierError> {
        Self::new(scope, local_id).map(|id| id.to_string())
    }

    /// Splits a handle on the first separator.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError::MissingSeparator`] when the handle has no
    /// separator, and [`IdentifierError::EmptyScope`] or
    /// [`IdentifierError::EmptyLocalId`] when either side is empty.
    pub fn decode(handle: &str) -> Result<Self, IdentifierError> {
        let Some((scope, local_id)) = handle.split_once(SEPARATOR) else {
            return Err(IdentifierError::MissingSeparator(handle.to_owned()));
        };
        Self::new(scope, local_id)
    }

    /// Partition the resource belongs to.
    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Identifier of the resource within its partition.
    #[must_use]
    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// Returns `true` when both identifiers share a partition.
    #[must_use]
    pub fn same_scope(&self, other: &Self) -> bool {
        self.scope == other.scope
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEPARATOR}{}", self.scope, self.local_id)
    }
}

impl FromStr for ResourceId {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

impl TryFrom<String> for ResourceId {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::decode(&value)
    }
}

impl From<ResourceId> for String {
    fn from(value: ResourceId) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn encode_joins_scope_and_local_id() {
        let handle = ResourceId::encode("us-east-1", "vol-4282672b").expect("encode");
        assert_eq!(handle, "us-east-1/vol-4282672b");
    }

    #[rstest]
    fn decode_splits_on_first_separator_only() {
        let id = ResourceId::decode("us-east-1/vol-1").expect("decode");
        assert_eq!(id.scope(), "us-east-1");
        assert_eq!(id.local_id(), "vol-1");

        let err = ResourceId::decode("us-east-1/vol/1").expect_err("nested separator");
        assert_eq!(err, IdentifierError::SeparatorInLocalId(String::from("vol/1")));
    }

    #[rstest]
    #[case("vol-1", IdentifierError::MissingSeparator(String::from("vol-1")))]
    #[case("/vol-1", IdentifierError::EmptyScope)]
    #[case("us-east-1/", IdentifierError::EmptyLocalId)]
    #[case("", IdentifierError::MissingSeparator(String::new()))]
    fn decode_rejects_malformed_handles(#[case] handle: &str, #[case] expected: IdentifierError) {
        assert_eq!(ResourceId::decode(handle), Err(expected));
    }

    #[rstest]
    #[case("eu-west-1", "a/b", IdentifierError::SeparatorInLocalId(String::from("a/b")))]
    #[case("eu/west", "1", IdentifierError::SeparatorInScope(String::from("eu/west")))]
    #[case("", "1", IdentifierError::EmptyScope)]
    fn encode_rejects_unroutable_parts(
        #[case] scope: &str,
        #[case] local_id: &str,
        #[case] expected: IdentifierError,
    ) {
        assert_eq!(ResourceId::encode(scope, local_id), Err(expected));
    }

    #[rstest]
    fn serde_uses_the_encoded_handle() {
        let id = ResourceId::new("us-east-1", "snap-78a54011").expect("id");
        let json = serde_json::to_string(&id).expect("serialise");
        assert_eq!(json, r#""us-east-1/snap-78a54011""#);
        let back: ResourceId = serde_json::from_str(&json).expect("deserialise");
        assert_eq!(back, id);
        assert!(serde_json::from_str::<ResourceId>(r#""no-separator""#).is_err());
    }
}
