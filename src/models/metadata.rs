use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Compact schema listing: schema/database name -> tables -> column names.
pub type SchemaMap = BTreeMap<String, SchemaEntry>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaEntry {
    /// Table name -> column names in ordinal order
    pub tables: BTreeMap<String, Vec<String>>,
}

/// Full column metadata for one table.
///
/// MySQL reports its scope as `database`, PostgreSQL as `schema`; only the one
/// that applies is serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub table: String,
    pub columns: Vec<ColumnDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Backend-native declared type, not normalized across backends
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub comment: Option<String>,
}

impl ColumnDescriptor {
    /// Build from raw `information_schema` values
    pub fn from_catalog(
        name: String,
        data_type: String,
        is_nullable: &str,
        default: Option<String>,
        comment: Option<String>,
    ) -> Self {
        Self {
            name,
            data_type,
            nullable: is_nullable.eq_ignore_ascii_case("YES"),
            default,
            comment: comment.filter(|c| !c.is_empty()),
        }
    }
}
