use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while parsing a DID string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DidError {
    #[error("DID must start with 'did:'")]
    MissingScheme,
    #[error("DID method must be non-empty lowercase alphanumeric, got `{0}`")]
    InvalidMethod(String),
    #[error("DID method-specific identifier is empty")]
    EmptyIdentifier,
    #[error("DID method-specific identifier contains invalid character `{0}`")]
    InvalidCharacter(char),
}

/// Decentralized identifier, `did:<method>:<method-specific-id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Did(String);

impl Did {
    pub fn parse(value: impl Into<String>) -> Result<Self, DidError> {
        let value = value.into();
        validate(&value)?;
        Ok(Did(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn method(&self) -> &str {
        // validated on construction: "did:" + method + ":" + id
        self.0[4..].split(':').next().unwrap_or_default()
    }

    pub fn method_specific_id(&self) -> &str {
        let rest = &self.0[4..];
        rest.split_once(':').map(|(_, id)| id).unwrap_or_default()
    }
}

fn validate(value: &str) -> Result<(), DidError> {
    let rest = value.strip_prefix("did:").ok_or(DidError::MissingScheme)?;
    let (method, id) = rest
        .split_once(':')
        .ok_or_else(|| DidError::InvalidMethod(rest.to_string()))?;

    if method.is_empty()
        || !method
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    {
        return Err(DidError::InvalidMethod(method.to_string()));
    }
    if id.is_empty() {
        return Err(DidError::EmptyIdentifier);
    }
    if let Some(bad) = id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '%' | '-')))
    {
        return Err(DidError::InvalidCharacter(bad));
    }
    Ok(())
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Did {
    type Err = DidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Did::parse(s)
    }
}

impl TryFrom<String> for Did {
    type Error = DidError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Did::parse(value)
    }
}

impl From<Did> for String {
    fn from(value: Did) -> Self {
        value.0
    }
}

impl AsRef<str> for Did {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_method_and_identifier() {
        let did = Did::parse("did:example:123").unwrap();
        assert_eq!(did.method(), "example");
        assert_eq!(did.method_specific_id(), "123");
    }

    #[test]
    fn identifier_may_contain_colons() {
        let did = Did::parse("did:indybesu:testnet:0xabc").unwrap();
        assert_eq!(did.method(), "indybesu");
        assert_eq!(did.method_specific_id(), "testnet:0xabc");
    }

    #[test]
    fn rejects_malformed_dids() {
        assert_eq!(Did::parse("example:123"), Err(DidError::MissingScheme));
        assert!(matches!(
            Did::parse("did:Ex:123"),
            Err(DidError::InvalidMethod(_))
        ));
        assert!(matches!(Did::parse("did:example"), Err(DidError::InvalidMethod(_))));
        assert_eq!(Did::parse("did:example:"), Err(DidError::EmptyIdentifier));
        assert_eq!(
            Did::parse("did:example:a b"),
            Err(DidError::InvalidCharacter(' '))
        );
    }

    #[test]
    fn json_rejects_invalid_did() {
        assert!(serde_json::from_str::<Did>("\"did:example:ok\"").is_ok());
        assert!(serde_json::from_str::<Did>("\"not-a-did\"").is_err());
    }
}
