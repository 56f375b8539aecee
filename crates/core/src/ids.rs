//! Store-assigned identifiers for delete transactions and log entries.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a delete transaction record.
///
/// The same value is written into the deletion marker column of every entity
/// deleted under the transaction, so it doubles as the marker value.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct TransactionId(i64);

impl TransactionId {
    /// Wrap a raw store id.
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the raw store id.
    pub const fn get(self) -> i64 {
        self.0
    }

    /// Parse from a string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        s.trim()
            .parse::<i64>()
            .map(Self)
            .map_err(|e| crate::Error::InvalidId(format!("invalid transaction id '{s}': {e}")))
    }
}

impl fmt::Debug for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransactionId({})", self.0)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TransactionId {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<TransactionId> for i64 {
    fn from(id: TransactionId) -> Self {
        id.0
    }
}

/// Identifier of a single deletion log entry.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct LogEntryId(i64);

impl LogEntryId {
    /// Wrap a raw store id.
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the raw store id.
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Debug for LogEntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LogEntryId({})", self.0)
    }
}

impl fmt::Display for LogEntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_id_parse() {
        assert_eq!(TransactionId::parse("42").unwrap(), TransactionId::new(42));
        assert_eq!(TransactionId::parse(" 7 ").unwrap().get(), 7);
        assert!(TransactionId::parse("abc").is_err());
        assert!(TransactionId::parse("").is_err());
    }

    #[test]
    fn test_transaction_id_serializes_as_plain_integer() {
        let json = serde_json::to_string(&TransactionId::new(12)).unwrap();
        assert_eq!(json, "12");
        let back: TransactionId = serde_json::from_str("12").unwrap();
        assert_eq!(back, TransactionId::new(12));
    }
}
