//! Validated SQL identifiers.
//!
//! Table and column names of the log tables and of soft-deletable entities are
//! configurable, which means they end up interpolated into SQL text. Only plain
//! identifiers are accepted so that interpolation cannot change statement shape.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Maximum accepted identifier length.
pub const MAX_IDENT_LEN: usize = 63;

/// A table or column name matching `[A-Za-z_][A-Za-z0-9_]*`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Ident(String);

impl Ident {
    /// Validate and wrap an identifier.
    pub fn new(name: impl Into<String>) -> crate::Result<Self> {
        let name = name.into();
        validate(&name)?;
        Ok(Self(name))
    }

    /// Wrap a compile-time identifier.
    ///
    /// Panics on an invalid name; only use with string literals.
    pub fn from_static(name: &'static str) -> Self {
        match Self::new(name) {
            Ok(ident) => ident,
            Err(e) => panic!("{e}"),
        }
    }

    /// Get the identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn validate(name: &str) -> crate::Result<()> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err(crate::Error::InvalidIdentifier(
            "identifier cannot be empty".to_string(),
        ));
    };
    if name.len() > MAX_IDENT_LEN {
        return Err(crate::Error::InvalidIdentifier(format!(
            "'{name}' exceeds {MAX_IDENT_LEN} characters"
        )));
    }
    if !(first.is_ascii_alphabetic() || first == '_')
        || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(crate::Error::InvalidIdentifier(format!(
            "'{name}' must match [A-Za-z_][A-Za-z0-9_]*"
        )));
    }
    Ok(())
}

impl<'de> Deserialize<'de> for Ident {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ident::new(s).map_err(serde::de::Error::custom)
    }
}

impl AsRef<str> for Ident {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ident({})", self.0)
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
