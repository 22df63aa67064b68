//! Permission entity: one row per protected route.
//!
//! Permissions are seeded from the route table at startup and are read-only
//! through the API; roles reference them through `role_permission`.

use serde::{Deserialize, Serialize};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use uuid::Uuid;

use crate::db::Database;
use crate::i18n::Locale;
use crate::orm::traits::{ColumnDef, Entity, FieldSet, QuerySpec, RelationLoader, SqlValue};
use crate::orm::FilterValue;

#[derive(Debug, Clone, Serialize)]
pub struct Permission {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub method: String,
    pub tag: String,
}

static COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("id", "TEXT").primary_key(),
    ColumnDef::new("name", "TEXT"),
    ColumnDef::new("url", "TEXT"),
    ColumnDef::new("method", "TEXT"),
    ColumnDef::new("tag", "TEXT"),
];

impl Entity for Permission {
    const TABLE_NAME: &'static str = "permission";

    fn visible_name(locale: Locale) -> &'static str {
        match locale {
            Locale::EnUs => "Permission",
            Locale::ZhCn => "权限",
        }
    }

    fn columns() -> &'static [ColumnDef] {
        COLUMNS
    }

    fn table_constraints() -> &'static [&'static str] {
        &["UNIQUE (url, method)"]
    }

    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get::<uuid::fmt::Hyphenated, _>("id")?.into_uuid(),
            name: row.try_get("name")?,
            url: row.try_get("url")?,
            method: row.try_get("method")?,
            tag: row.try_get("tag")?,
        })
    }

    fn id_value(&self) -> SqlValue {
        self.id.into()
    }

    fn field_value(&self, field: &str) -> Option<SqlValue> {
        match field {
            "id" => Some(self.id.into()),
            "name" => Some(self.name.as_str().into()),
            "url" => Some(self.url.as_str().into()),
            "method" => Some(self.method.as_str().into()),
            "tag" => Some(self.tag.as_str().into()),
            _ => None,
        }
    }
}

impl RelationLoader for Permission {
    async fn load_relations(
        _entities: &mut [Self],
        _pool: &Database,
        _relations: &[&str],
    ) -> Result<(), sqlx::Error> {
        Ok(())
    }
}

/// Used only by the route-table seeder; not exposed over HTTP.
#[derive(Debug, Clone)]
pub struct PermissionCreate {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub method: String,
    pub tag: String,
}

impl FieldSet for PermissionCreate {
    fn assignments(&self) -> Vec<(&'static str, SqlValue)> {
        vec![
            ("id", self.id.into()),
            ("name", self.name.as_str().into()),
            ("url", self.url.as_str().into()),
            ("method", self.method.as_str().into()),
            ("tag", self.tag.as_str().into()),
        ]
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PermissionQuery {
    pub q: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub name: Option<String>,
    pub url: Option<String>,
    pub method: Option<String>,
    pub tag: Option<String>,
}

impl QuerySpec for PermissionQuery {
    fn q(&self) -> Option<&str> {
        self.q.as_deref()
    }

    fn limit(&self) -> Option<i64> {
        self.limit
    }

    fn offset(&self) -> Option<i64> {
        self.offset
    }

    fn filters(&self) -> Vec<(String, FilterValue)> {
        let mut filters = Vec::new();
        if let Some(name) = &self.name {
            filters.push(("name".to_string(), FilterValue::Value(name.as_str().into())));
        }
        if let Some(url) = &self.url {
            filters.push(("url".to_string(), FilterValue::Value(url.as_str().into())));
        }
        if let Some(method) = &self.method {
            filters.push(("method".to_string(), FilterValue::Value(method.as_str().into())));
        }
        if let Some(tag) = &self.tag {
            filters.push(("tag".to_string(), FilterValue::Value(tag.as_str().into())));
        }
        filters
    }
}
