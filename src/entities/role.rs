//! Role entity: the unit of authorization.
//!
//! Roles own two many-to-many associations (permissions and menus) that the
//! API reconciles as id sets, plus counts that are hydrated on demand.

use serde::{Deserialize, Serialize};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use uuid::Uuid;

use crate::db::Database;
use crate::i18n::Locale;
use crate::orm::FilterValue;
use crate::orm::traits::{
    ColumnDef, Entity, FieldSet, ManyToMany, QuerySpec, RelationLoader, SqlValue,
};

use super::permission::Permission;
use super::{de_comma_list, de_tri_state};

/// Slug of the seeded superuser role; it bypasses permission checks and can
/// never be created again through the API.
pub const ADMIN_ROLE_SLUG: &str = "admin";

#[derive(Debug, Clone, Serialize)]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    /// Hydrated by `load_relations("permissions")`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<Permission>>,
    /// Hydrated by `load_relations("menu_ids")`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub menu_ids: Option<Vec<i64>>,
    /// Hydrated by `load_relations("user_count")`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_count: Option<i64>,
}

static COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("id", "INTEGER").primary_key(),
    ColumnDef::new("name", "TEXT"),
    ColumnDef::new("slug", "TEXT").unique(),
    ColumnDef::new("description", "TEXT").nullable(),
    ColumnDef::new("created_at", "TEXT").default_expr("(datetime('now'))"),
    ColumnDef::new("updated_at", "TEXT").default_expr("(datetime('now'))"),
];

impl Role {
    pub const PERMISSIONS: ManyToMany = ManyToMany {
        join_table: "role_permission",
        local_column: "role_id",
        remote_column: "permission_id",
    };

    pub const MENUS: ManyToMany = ManyToMany {
        join_table: "role_menu",
        local_column: "role_id",
        remote_column: "menu_id",
    };

    pub fn is_admin(&self) -> bool {
        self.slug == ADMIN_ROLE_SLUG
    }
}

impl Entity for Role {
    const TABLE_NAME: &'static str = "role";

    fn visible_name(locale: Locale) -> &'static str {
        match locale {
            Locale::EnUs => "Role",
            Locale::ZhCn => "用户角色",
        }
    }

    fn columns() -> &'static [ColumnDef] {
        COLUMNS
    }

    fn search_fields() -> &'static [&'static str] {
        &["name"]
    }

    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            slug: row.try_get("slug")?,
            description: row.try_get("description")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            permissions: None,
            menu_ids: None,
            user_count: None,
        })
    }

    fn id_value(&self) -> SqlValue {
        self.id.into()
    }

    fn field_value(&self, field: &str) -> Option<SqlValue> {
        match field {
            "id" => Some(self.id.into()),
            "name" => Some(self.name.as_str().into()),
            "slug" => Some(self.slug.as_str().into()),
            "description" => Some(self.description.clone().into()),
            "created_at" => Some(self.created_at.as_str().into()),
            "updated_at" => Some(self.updated_at.as_str().into()),
            _ => None,
        }
    }
}

impl RelationLoader for Role {
    async fn load_relations(
        entities: &mut [Self],
        pool: &Database,
        relations: &[&str],
    ) -> Result<(), sqlx::Error> {
        if entities.is_empty() {
            return Ok(());
        }
        let ids: Vec<i64> = entities.iter().map(|r| r.id).collect();
        let placeholders = vec!["?"; ids.len()].join(", ");

        if relations.contains(&"permissions") {
            let sql = format!(
                "SELECT rp.role_id, p.id, p.name, p.url, p.method, p.tag \
                 FROM permission p \
                 JOIN role_permission rp ON rp.permission_id = p.id \
                 WHERE rp.role_id IN ({placeholders})"
            );
            let mut query = sqlx::query(&sql);
            for id in &ids {
                query = query.bind(id);
            }
            let rows = query.fetch_all(pool).await?;

            for role in entities.iter_mut() {
                role.permissions = Some(Vec::new());
            }
            for row in rows {
                let role_id: i64 = row.try_get("role_id")?;
                let permission = Permission {
                    id: row.try_get::<uuid::fmt::Hyphenated, _>("id")?.into_uuid(),
                    name: row.try_get("name")?,
                    url: row.try_get("url")?,
                    method: row.try_get("method")?,
                    tag: row.try_get("tag")?,
                };
                if let Some(role) = entities.iter_mut().find(|r| r.id == role_id) {
                    role.permissions.get_or_insert_with(Vec::new).push(permission);
                }
            }
        }

        if relations.contains(&"menu_ids") {
            let sql = format!(
                "SELECT role_id, menu_id FROM role_menu WHERE role_id IN ({placeholders})"
            );
            let mut query = sqlx::query(&sql);
            for id in &ids {
                query = query.bind(id);
            }
            let rows = query.fetch_all(pool).await?;

            for role in entities.iter_mut() {
                role.menu_ids = Some(Vec::new());
            }
            for row in rows {
                let role_id: i64 = row.try_get("role_id")?;
                let menu_id: i64 = row.try_get("menu_id")?;
                if let Some(role) = entities.iter_mut().find(|r| r.id == role_id) {
                    role.menu_ids.get_or_insert_with(Vec::new).push(menu_id);
                }
            }
        }

        if relations.contains(&"user_count") {
            let sql = format!(
                "SELECT role_id, COUNT(*) AS n FROM user WHERE role_id IN ({placeholders}) GROUP BY role_id"
            );
            let mut query = sqlx::query(&sql);
            for id in &ids {
                query = query.bind(id);
            }
            let rows = query.fetch_all(pool).await?;

            for role in entities.iter_mut() {
                role.user_count = Some(0);
            }
            for row in rows {
                let role_id: i64 = row.try_get("role_id")?;
                let n: i64 = row.try_get("n")?;
                if let Some(role) = entities.iter_mut().find(|r| r.id == role_id) {
                    role.user_count = Some(n);
                }
            }
        }

        Ok(())
    }
}

/// Compact role reference embedded in user/group payloads.
#[derive(Debug, Clone, Serialize)]
pub struct RoleBrief {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct RoleCreate {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    /// Consumed by relationship wiring, never inserted as a column.
    #[serde(default)]
    pub permission_ids: Option<Vec<Uuid>>,
    #[serde(default)]
    pub menu_ids: Option<Vec<i64>>,
}

impl FieldSet for RoleCreate {
    fn assignments(&self) -> Vec<(&'static str, SqlValue)> {
        let mut fields: Vec<(&'static str, SqlValue)> = vec![
            ("name", self.name.as_str().into()),
            ("slug", self.slug.as_str().into()),
        ];
        if let Some(description) = &self.description {
            fields.push(("description", description.as_str().into()));
        }
        if let Some(ids) = &self.permission_ids {
            fields.push(("permission_ids", SqlValue::Json(serde_json::json!(ids))));
        }
        if let Some(ids) = &self.menu_ids {
            fields.push(("menu_ids", SqlValue::Json(serde_json::json!(ids))));
        }
        fields
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RoleUpdate {
    pub name: Option<String>,
    pub slug: Option<String>,
    #[serde(default, deserialize_with = "de_tri_state")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub permission_ids: Option<Vec<Uuid>>,
    #[serde(default)]
    pub menu_ids: Option<Vec<i64>>,
}

impl FieldSet for RoleUpdate {
    fn assignments(&self) -> Vec<(&'static str, SqlValue)> {
        let mut fields: Vec<(&'static str, SqlValue)> = Vec::new();
        if let Some(name) = &self.name {
            fields.push(("name", name.as_str().into()));
        }
        if let Some(slug) = &self.slug {
            fields.push(("slug", slug.as_str().into()));
        }
        if let Some(description) = &self.description {
            fields.push(("description", description.clone().into()));
        }
        if let Some(ids) = &self.permission_ids {
            fields.push(("permission_ids", SqlValue::Json(serde_json::json!(ids))));
        }
        if let Some(ids) = &self.menu_ids {
            fields.push(("menu_ids", SqlValue::Json(serde_json::json!(ids))));
        }
        fields
    }
}

/// Field names wired through `update_relationship_field` rather than SQL
/// column writes; every repository call on roles excludes these.
pub const ROLE_RELATION_FIELDS: &[&str] = &["permission_ids", "menu_ids"];

#[derive(Debug, Default, Deserialize)]
pub struct RoleQuery {
    pub q: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub order_by: Option<String>,
    pub order: Option<crate::orm::Order>,
    #[serde(default, deserialize_with = "de_comma_list")]
    pub id: Option<Vec<i64>>,
    pub name: Option<String>,
    pub slug: Option<String>,
}

impl QuerySpec for RoleQuery {
    fn q(&self) -> Option<&str> {
        self.q.as_deref()
    }

    fn limit(&self) -> Option<i64> {
        self.limit
    }

    fn offset(&self) -> Option<i64> {
        self.offset
    }

    fn order_by(&self) -> Option<&str> {
        self.order_by.as_deref()
    }

    fn order(&self) -> Option<crate::orm::Order> {
        self.order
    }

    fn filters(&self) -> Vec<(String, FilterValue)> {
        let mut filters = Vec::new();
        if let Some(ids) = &self.id {
            filters.push((
                "id".to_string(),
                FilterValue::List(ids.iter().map(|&id| id.into()).collect()),
            ));
        }
        if let Some(name) = &self.name {
            filters.push(("name".to_string(), FilterValue::Value(name.as_str().into())));
        }
        if let Some(slug) = &self.slug {
            filters.push(("slug".to_string(), FilterValue::Value(slug.as_str().into())));
        }
        filters
    }
}
