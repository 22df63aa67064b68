//! Group entity: an organizational unit that carries a default role.

use serde::{Deserialize, Serialize};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::db::Database;
use crate::i18n::Locale;
use crate::orm::FilterValue;
use crate::orm::traits::{ColumnDef, Entity, FieldSet, QuerySpec, RelationLoader, SqlValue};

use super::role::RoleBrief;
use super::{de_comma_list, de_tri_state};

#[derive(Debug, Clone, Serialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub role_id: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
    /// Hydrated by `load_relations("role")`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<RoleBrief>,
    /// Hydrated by `load_relations("user_count")`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_count: Option<i64>,
}

static COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("id", "INTEGER").primary_key(),
    ColumnDef::new("name", "TEXT").unique(),
    ColumnDef::new("description", "TEXT").nullable(),
    ColumnDef::new("role_id", "INTEGER")
        .nullable()
        .references("role", "id")
        .on_delete("RESTRICT"),
    ColumnDef::new("created_at", "TEXT").default_expr("(datetime('now'))"),
    ColumnDef::new("updated_at", "TEXT").default_expr("(datetime('now'))"),
];

impl Entity for Group {
    const TABLE_NAME: &'static str = "user_group";

    fn visible_name(locale: Locale) -> &'static str {
        match locale {
            Locale::EnUs => "Group",
            Locale::ZhCn => "用户组",
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
            description: row.try_get("description")?,
            role_id: row.try_get("role_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            role: None,
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
            "description" => Some(self.description.clone().into()),
            "role_id" => Some(self.role_id.into()),
            "created_at" => Some(self.created_at.as_str().into()),
            "updated_at" => Some(self.updated_at.as_str().into()),
            _ => None,
        }
    }
}

impl RelationLoader for Group {
    async fn load_relations(
        entities: &mut [Self],
        pool: &Database,
        relations: &[&str],
    ) -> Result<(), sqlx::Error> {
        if entities.is_empty() {
            return Ok(());
        }

        if relations.contains(&"role") {
            let role_ids: Vec<i64> = entities.iter().filter_map(|g| g.role_id).collect();
            if !role_ids.is_empty() {
                let placeholders = vec!["?"; role_ids.len()].join(", ");
                let sql = format!("SELECT id, name FROM role WHERE id IN ({placeholders})");
                let mut query = sqlx::query(&sql);
                for id in &role_ids {
                    query = query.bind(id);
                }
                let rows = query.fetch_all(pool).await?;
                for row in rows {
                    let id: i64 = row.try_get("id")?;
                    let name: String = row.try_get("name")?;
                    for group in entities.iter_mut().filter(|g| g.role_id == Some(id)) {
                        group.role = Some(RoleBrief {
                            id,
                            name: name.clone(),
                        });
                    }
                }
            }
        }

        if relations.contains(&"user_count") {
            let ids: Vec<i64> = entities.iter().map(|g| g.id).collect();
            let placeholders = vec!["?"; ids.len()].join(", ");
            let sql = format!(
                "SELECT group_id, COUNT(*) AS n FROM user WHERE group_id IN ({placeholders}) GROUP BY group_id"
            );
            let mut query = sqlx::query(&sql);
            for id in &ids {
                query = query.bind(id);
            }
            let rows = query.fetch_all(pool).await?;

            for group in entities.iter_mut() {
                group.user_count = Some(0);
            }
            for row in rows {
                let group_id: i64 = row.try_get("group_id")?;
                let n: i64 = row.try_get("n")?;
                if let Some(group) = entities.iter_mut().find(|g| g.id == group_id) {
                    group.user_count = Some(n);
                }
            }
        }

        Ok(())
    }
}

/// Compact group reference embedded in user payloads.
#[derive(Debug, Clone, Serialize)]
pub struct GroupBrief {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct GroupCreate {
    pub name: String,
    pub description: Option<String>,
    pub role_id: Option<i64>,
}

impl FieldSet for GroupCreate {
    fn assignments(&self) -> Vec<(&'static str, SqlValue)> {
        let mut fields: Vec<(&'static str, SqlValue)> =
            vec![("name", self.name.as_str().into())];
        if let Some(description) = &self.description {
            fields.push(("description", description.as_str().into()));
        }
        if let Some(role_id) = self.role_id {
            fields.push(("role_id", role_id.into()));
        }
        fields
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct GroupUpdate {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "de_tri_state")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "de_tri_state")]
    pub role_id: Option<Option<i64>>,
}

impl FieldSet for GroupUpdate {
    fn assignments(&self) -> Vec<(&'static str, SqlValue)> {
        let mut fields: Vec<(&'static str, SqlValue)> = Vec::new();
        if let Some(name) = &self.name {
            fields.push(("name", name.as_str().into()));
        }
        if let Some(description) = &self.description {
            fields.push(("description", description.clone().into()));
        }
        if let Some(role_id) = &self.role_id {
            fields.push(("role_id", (*role_id).into()));
        }
        fields
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct GroupQuery {
    pub q: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub order_by: Option<String>,
    pub order: Option<crate::orm::Order>,
    #[serde(default, deserialize_with = "de_comma_list")]
    pub id: Option<Vec<i64>>,
    pub name: Option<String>,
    pub role_id: Option<i64>,
}

impl QuerySpec for GroupQuery {
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
        if let Some(role_id) = self.role_id {
            filters.push(("role_id".to_string(), FilterValue::Value(role_id.into())));
        }
        filters
    }
}
