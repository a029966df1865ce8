//! Target schema definitions
//!
//! A [`Schema`] describes one insertion target: a table (relational) or a
//! logical namespace (key-value), its ordered columns, and — for relational
//! targets — the conflict policy applied on duplicate keys.
//!
//! Schemas are immutable and shared behind [`Arc`]. Two schemas are the same
//! flush group iff they are the same `Arc` allocation; two separately built
//! schemas with identical contents are distinct groups.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Conflict policy for relational insertion targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConflictPolicy {
    /// Plain insert, duplicate keys fail
    #[default]
    Insert,
    /// Skip rows that hit an existing key
    Ignore,
    /// Replace the existing row wholesale
    Replace,
    /// Update the existing row's non-key columns
    Update,
}

/// Which kind of backend a schema targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    /// Relational table with a conflict policy
    Relational(ConflictPolicy),
    /// Key-value namespace (no conflict policy)
    KeyValue,
}

impl SchemaKind {
    /// Short name used in mismatch errors
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Relational(_) => "relational",
            Self::KeyValue => "key-value",
        }
    }
}

/// Immutable description of one insertion target
#[derive(Debug)]
pub struct Schema {
    name: String,
    columns: Vec<String>,
    kind: SchemaKind,
}

impl Schema {
    /// Create a relational schema
    pub fn relational(
        name: impl Into<String>,
        policy: ConflictPolicy,
        columns: impl IntoIterator<Item = impl Into<String>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            kind: SchemaKind::Relational(policy),
        })
    }

    /// Create a key-value schema
    pub fn key_value(
        name: impl Into<String>,
        columns: impl IntoIterator<Item = impl Into<String>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            kind: SchemaKind::KeyValue,
        })
    }

    /// Target name (table or namespace)
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared columns, in order
    #[inline]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Backend kind
    #[inline]
    pub fn kind(&self) -> SchemaKind {
        self.kind
    }

    /// Conflict policy, for relational schemas
    pub fn policy(&self) -> Option<ConflictPolicy> {
        match self.kind {
            SchemaKind::Relational(policy) => Some(policy),
            SchemaKind::KeyValue => None,
        }
    }

    /// Whether this schema targets a relational backend
    #[inline]
    pub fn is_relational(&self) -> bool {
        matches!(self.kind, SchemaKind::Relational(_))
    }

    /// Check the schema invariants: non-empty name, at least one column,
    /// no duplicate columns.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::EmptySchemaName);
        }
        if self.columns.is_empty() {
            return Err(Error::MissingColumn);
        }
        let mut seen = HashSet::with_capacity(self.columns.len());
        for column in &self.columns {
            if !seen.insert(column.as_str()) {
                return Err(Error::DuplicateColumn {
                    column: column.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Flush-group identity of a shared schema: the `Arc` allocation address.
#[inline]
pub(crate) fn schema_identity(schema: &Arc<Schema>) -> usize {
    Arc::as_ptr(schema) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relational_schema_basic() {
        let s = Schema::relational("users", ConflictPolicy::Ignore, ["id", "name", "email"]);
        assert_eq!(s.name(), "users");
        assert_eq!(s.columns(), &["id", "name", "email"]);
        assert_eq!(s.policy(), Some(ConflictPolicy::Ignore));
        assert!(s.is_relational());
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_key_value_schema() {
        let s = Schema::key_value("sessions", ["token", "user_id"]);
        assert_eq!(s.policy(), None);
        assert!(!s.is_relational());
        assert_eq!(s.kind().name(), "key-value");
    }

    #[test]
    fn test_column_order_preserved() {
        let s = Schema::relational("t", ConflictPolicy::Insert, ["c", "a", "b"]);
        assert_eq!(s.columns(), &["c", "a", "b"]);
    }

    #[test]
    fn test_validate_rejects_empty_name() {
        let s = Schema::relational("", ConflictPolicy::Insert, ["id"]);
        assert!(matches!(s.validate(), Err(Error::EmptySchemaName)));
    }

    #[test]
    fn test_validate_rejects_no_columns() {
        let s = Schema::relational("t", ConflictPolicy::Insert, Vec::<String>::new());
        assert!(matches!(s.validate(), Err(Error::MissingColumn)));
    }

    #[test]
    fn test_validate_rejects_duplicate_columns() {
        let s = Schema::relational("t", ConflictPolicy::Insert, ["id", "name", "id"]);
        assert!(matches!(
            s.validate(),
            Err(Error::DuplicateColumn { column }) if column == "id"
        ));
    }

    #[test]
    fn test_identity_is_allocation_not_contents() {
        let a = Schema::relational("t", ConflictPolicy::Ignore, ["id"]);
        let b = Schema::relational("t", ConflictPolicy::Ignore, ["id"]);
        let a2 = Arc::clone(&a);

        assert_eq!(schema_identity(&a), schema_identity(&a2));
        assert_ne!(schema_identity(&a), schema_identity(&b));
    }
}
