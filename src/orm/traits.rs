//! Core traits for the repository layer.
//!
//! Every persisted type implements [`Entity`] by hand: a static column
//! registry, typed row decoding and a field-accessor method. There is no
//! string-driven reflection; the registry is the single source of truth for
//! schema generation, filter validation and constraint enforcement.

use chrono::{SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use uuid::Uuid;

use crate::db::Database;
use crate::i18n::Locale;

/// Column definition for schema generation and filter validation.
#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name: &'static str,
    /// SQLite column type (TEXT, INTEGER, REAL, BLOB)
    pub sql_type: &'static str,
    pub nullable: bool,
    pub is_primary_key: bool,
    pub unique: bool,
    /// Default value expression (e.g., "datetime('now')")
    pub default: Option<&'static str>,
    /// Referenced (table, column) for foreign-key columns.
    pub references: Option<(&'static str, &'static str)>,
    /// ON DELETE action for foreign-key columns (e.g. "RESTRICT", "CASCADE").
    pub on_delete: Option<&'static str>,
}

impl ColumnDef {
    pub const fn new(name: &'static str, sql_type: &'static str) -> Self {
        Self {
            name,
            sql_type,
            nullable: false,
            is_primary_key: false,
            unique: false,
            default: None,
            references: None,
            on_delete: None,
        }
    }

    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub const fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self
    }

    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub const fn default_expr(mut self, expr: &'static str) -> Self {
        self.default = Some(expr);
        self
    }

    pub const fn references(mut self, table: &'static str, column: &'static str) -> Self {
        self.references = Some((table, column));
        self
    }

    pub const fn on_delete(mut self, action: &'static str) -> Self {
        self.on_delete = Some(action);
        self
    }

    /// Generate the column definition SQL.
    pub fn to_sql(&self) -> String {
        let mut sql = format!("{} {}", self.name, self.sql_type);

        if self.is_primary_key {
            sql.push_str(" PRIMARY KEY");
        }

        if !self.nullable && !self.is_primary_key {
            sql.push_str(" NOT NULL");
        }

        if self.unique {
            sql.push_str(" UNIQUE");
        }

        if let Some(default) = self.default {
            sql.push_str(&format!(" DEFAULT {}", default));
        }

        if let Some((table, column)) = self.references {
            sql.push_str(&format!(" REFERENCES {}({})", table, column));
            if let Some(action) = self.on_delete {
                sql.push_str(&format!(" ON DELETE {}", action));
            }
        }

        sql
    }
}

/// Update semantics of a field, declared statically per entity.
///
/// `MergeableMap` fields are JSON objects whose updates merge key-by-key into
/// the stored value; `Scalar` and `List` fields are replaced outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldKind {
    #[default]
    Scalar,
    List,
    MergeableMap,
}

/// A SQL value that can be bound to a parameterized query.
///
/// JSON values are serialized to TEXT on bind, which is how all composite
/// fields are stored in SQLite.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Json(serde_json::Value),
    Null,
}

impl SqlValue {
    /// Falsy in the sense the constraint enforcer uses when deciding whether
    /// a unique-group column counts as "supplied": NULL, empty string,
    /// false, zero and JSON null all skip the group.
    pub fn is_falsy(&self) -> bool {
        match self {
            SqlValue::Null => true,
            SqlValue::Text(s) => s.is_empty(),
            SqlValue::Int(i) => *i == 0,
            SqlValue::Float(f) => *f == 0.0,
            SqlValue::Bool(b) => !*b,
            SqlValue::Json(v) => v.is_null(),
        }
    }

    /// Bind this value to a sqlx query at the next placeholder.
    pub fn bind_to<'q>(
        &'q self,
        query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    ) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
        match self {
            SqlValue::Text(s) => query.bind(s.as_str()),
            SqlValue::Int(i) => query.bind(*i),
            SqlValue::Float(f) => query.bind(*f),
            SqlValue::Bool(b) => query.bind(*b),
            SqlValue::Json(v) => query.bind(v.to_string()),
            SqlValue::Null => query.bind(None::<String>),
        }
    }

    /// Same as [`bind_to`](Self::bind_to) for scalar queries.
    pub fn bind_to_scalar<'q, O>(
        &'q self,
        query: sqlx::query::QueryScalar<'q, sqlx::Sqlite, O, sqlx::sqlite::SqliteArguments<'q>>,
    ) -> sqlx::query::QueryScalar<'q, sqlx::Sqlite, O, sqlx::sqlite::SqliteArguments<'q>> {
        match self {
            SqlValue::Text(s) => query.bind(s.as_str()),
            SqlValue::Int(i) => query.bind(*i),
            SqlValue::Float(f) => query.bind(*f),
            SqlValue::Bool(b) => query.bind(*b),
            SqlValue::Json(v) => query.bind(v.to_string()),
            SqlValue::Null => query.bind(None::<String>),
        }
    }
}

impl std::fmt::Display for SqlValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlValue::Text(s) => write!(f, "{s}"),
            SqlValue::Int(i) => write!(f, "{i}"),
            SqlValue::Float(v) => write!(f, "{v}"),
            SqlValue::Bool(b) => write!(f, "{b}"),
            SqlValue::Json(v) => write!(f, "{v}"),
            SqlValue::Null => write!(f, "null"),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(v as i64)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<Uuid> for SqlValue {
    fn from(v: Uuid) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<serde_json::Value> for SqlValue {
    fn from(v: serde_json::Value) -> Self {
        SqlValue::Json(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => SqlValue::Null,
        }
    }
}

/// Current UTC timestamp as an ISO-8601 string, the storage format for all
/// audit-time columns.
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Descriptor for a many-to-many association through a join table.
#[derive(Debug, Clone, Copy)]
pub struct ManyToMany {
    pub join_table: &'static str,
    /// Join-table column referencing the owning entity.
    pub local_column: &'static str,
    /// Join-table column referencing the related entity.
    pub remote_column: &'static str,
}

/// Metadata and field registry for a persisted entity.
pub trait Entity: Sized + Send + Sync + Unpin {
    /// The SQL table name (e.g. "user").
    const TABLE_NAME: &'static str;

    /// The primary key column name.
    const PRIMARY_KEY: &'static str = "id";

    /// Human-readable display name, used only to build error messages.
    fn visible_name(locale: Locale) -> &'static str;

    /// All column definitions for this entity's table.
    fn columns() -> &'static [ColumnDef];

    /// Fields eligible for free-text search. Empty means search is a no-op.
    fn search_fields() -> &'static [&'static str] {
        &[]
    }

    /// Update semantics tag for a column.
    fn field_kind(_field: &str) -> FieldKind {
        FieldKind::Scalar
    }

    /// Table-level constraint fragments appended to CREATE TABLE
    /// (e.g. `UNIQUE (url, method)`).
    fn table_constraints() -> &'static [&'static str] {
        &[]
    }

    /// Decode a row into this entity type.
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error>;

    /// Primary key of this row.
    fn id_value(&self) -> SqlValue;

    /// Current value of a column by name, or `None` for unknown columns.
    /// Written out explicitly per entity; this is the accessor registry the
    /// constraint enforcer and mutation engine read through.
    fn field_value(&self, field: &str) -> Option<SqlValue>;

    fn column_names() -> Vec<&'static str> {
        Self::columns().iter().map(|c| c.name).collect()
    }

    fn has_column(name: &str) -> bool {
        Self::columns().iter().any(|c| c.name == name)
    }

    /// Build a SELECT over all registered columns.
    fn select_sql() -> String {
        let columns: Vec<&str> = Self::columns().iter().map(|c| c.name).collect();
        format!("SELECT {} FROM {}", columns.join(", "), Self::TABLE_NAME)
    }

    /// Generate CREATE TABLE IF NOT EXISTS SQL.
    fn create_table_sql() -> String {
        let mut defs: Vec<String> = Self::columns().iter().map(|c| c.to_sql()).collect();
        defs.extend(Self::table_constraints().iter().map(|s| s.to_string()));
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
            Self::TABLE_NAME,
            defs.join(",\n  ")
        )
    }
}

/// Bulk relation hydration applied to fetched rows, never to count queries.
///
/// `relations` names which associations to load; unknown names are ignored so
/// callers can share load specs across entity types.
#[allow(async_fn_in_trait)]
pub trait RelationLoader: Sized {
    async fn load_relations(
        entities: &mut [Self],
        pool: &Database,
        relations: &[&str],
    ) -> Result<(), sqlx::Error>;
}

/// A create or update payload expressed through the field registry.
///
/// `assignments` returns only the fields present in the request, preserving
/// the tri-state distinction between an absent field and an explicit null.
pub trait FieldSet: Send + Sync {
    fn assignments(&self) -> Vec<(&'static str, SqlValue)>;
}

/// Sort direction for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    Ascend,
    Descend,
}

impl Order {
    pub fn to_sql(self) -> &'static str {
        match self {
            Order::Ascend => "ASC",
            Order::Descend => "DESC",
        }
    }
}

/// Structured filter/sort/page request for list endpoints.
pub trait QuerySpec: Send + Sync {
    /// Free-text search term.
    fn q(&self) -> Option<&str> {
        None
    }

    fn limit(&self) -> Option<i64>;

    fn offset(&self) -> Option<i64>;

    fn order_by(&self) -> Option<&str> {
        None
    }

    fn order(&self) -> Option<Order> {
        None
    }

    /// Filter entries for fields the client actually set. Keys may carry
    /// `__op` operator suffixes.
    fn filters(&self) -> Vec<(String, crate::orm::filter::FilterValue)>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_def_sql() {
        let col = ColumnDef::new("email", "TEXT").nullable().unique();
        assert_eq!(col.to_sql(), "email TEXT UNIQUE");

        let col = ColumnDef::new("id", "INTEGER").primary_key();
        assert_eq!(col.to_sql(), "id INTEGER PRIMARY KEY");

        let col = ColumnDef::new("group_id", "INTEGER")
            .references("group", "id")
            .on_delete("RESTRICT");
        assert_eq!(
            col.to_sql(),
            "group_id INTEGER NOT NULL REFERENCES group(id) ON DELETE RESTRICT"
        );
    }

    #[test]
    fn test_falsy_values() {
        assert!(SqlValue::Null.is_falsy());
        assert!(SqlValue::Text(String::new()).is_falsy());
        assert!(SqlValue::Bool(false).is_falsy());
        assert!(SqlValue::Int(0).is_falsy());
        assert!(!SqlValue::Int(7).is_falsy());
        assert!(!SqlValue::Text("x".into()).is_falsy());
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(SqlValue::from(None::<i64>), SqlValue::Null);
        assert_eq!(SqlValue::from(Some(3i64)), SqlValue::Int(3));
    }
}
