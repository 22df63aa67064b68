//! User entity: login identity plus profile fields.
//!
//! Email and phone are each unique but optional; a user needs at least one
//! to log in. `auth_info` is a JSON map that merges key-by-key on update
//! instead of being replaced wholesale.

use serde::{Deserialize, Serialize};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::db::Database;
use crate::i18n::Locale;
use crate::orm::FilterValue;
use crate::orm::traits::{
    ColumnDef, Entity, FieldKind, FieldSet, QuerySpec, RelationLoader, SqlValue,
};

use super::group::GroupBrief;
use super::role::RoleBrief;
use super::{de_comma_list, de_tri_state};

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub avatar: Option<String>,
    pub last_login: Option<String>,
    pub is_active: bool,
    /// Free-form per-provider auth metadata, merged on update.
    pub auth_info: Option<serde_json::Value>,
    pub group_id: Option<i64>,
    pub role_id: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
    /// Hydrated by `load_relations("group")`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<GroupBrief>,
    /// Hydrated by `load_relations("role")`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<RoleBrief>,
}

static COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("id", "INTEGER").primary_key(),
    ColumnDef::new("name", "TEXT"),
    ColumnDef::new("password", "TEXT"),
    ColumnDef::new("email", "TEXT").nullable().unique(),
    ColumnDef::new("phone", "TEXT").nullable().unique(),
    ColumnDef::new("avatar", "TEXT").nullable(),
    ColumnDef::new("last_login", "TEXT").nullable(),
    ColumnDef::new("is_active", "INTEGER").default_expr("1"),
    ColumnDef::new("auth_info", "TEXT").nullable(),
    ColumnDef::new("group_id", "INTEGER")
        .nullable()
        .references("user_group", "id")
        .on_delete("RESTRICT"),
    ColumnDef::new("role_id", "INTEGER")
        .nullable()
        .references("role", "id")
        .on_delete("RESTRICT"),
    ColumnDef::new("created_at", "TEXT").default_expr("(datetime('now'))"),
    ColumnDef::new("updated_at", "TEXT").default_expr("(datetime('now'))"),
];

impl Entity for User {
    const TABLE_NAME: &'static str = "user";

    fn visible_name(locale: Locale) -> &'static str {
        match locale {
            Locale::EnUs => "User",
            Locale::ZhCn => "用户",
        }
    }

    fn columns() -> &'static [ColumnDef] {
        COLUMNS
    }

    fn search_fields() -> &'static [&'static str] {
        &["name", "email", "phone"]
    }

    fn field_kind(field: &str) -> FieldKind {
        match field {
            "auth_info" => FieldKind::MergeableMap,
            _ => FieldKind::Scalar,
        }
    }

    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let auth_info: Option<String> = row.try_get("auth_info")?;
        let auth_info = match auth_info {
            Some(raw) => Some(
                serde_json::from_str(&raw)
                    .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            ),
            None => None,
        };
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            password: row.try_get("password")?,
            email: row.try_get("email")?,
            phone: row.try_get("phone")?,
            avatar: row.try_get("avatar")?,
            last_login: row.try_get("last_login")?,
            is_active: row.try_get("is_active")?,
            auth_info,
            group_id: row.try_get("group_id")?,
            role_id: row.try_get("role_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            group: None,
            role: None,
        })
    }

    fn id_value(&self) -> SqlValue {
        self.id.into()
    }

    fn field_value(&self, field: &str) -> Option<SqlValue> {
        match field {
            "id" => Some(self.id.into()),
            "name" => Some(self.name.as_str().into()),
            "password" => Some(self.password.as_str().into()),
            "email" => Some(self.email.clone().into()),
            "phone" => Some(self.phone.clone().into()),
            "avatar" => Some(self.avatar.clone().into()),
            "last_login" => Some(self.last_login.clone().into()),
            "is_active" => Some(self.is_active.into()),
            "auth_info" => Some(match &self.auth_info {
                Some(value) => SqlValue::Json(value.clone()),
                None => SqlValue::Null,
            }),
            "group_id" => Some(self.group_id.into()),
            "role_id" => Some(self.role_id.into()),
            "created_at" => Some(self.created_at.as_str().into()),
            "updated_at" => Some(self.updated_at.as_str().into()),
            _ => None,
        }
    }
}

impl RelationLoader for User {
    async fn load_relations(
        entities: &mut [Self],
        pool: &Database,
        relations: &[&str],
    ) -> Result<(), sqlx::Error> {
        if entities.is_empty() {
            return Ok(());
        }

        if relations.contains(&"group") {
            let group_ids: Vec<i64> = entities.iter().filter_map(|u| u.group_id).collect();
            if !group_ids.is_empty() {
                let placeholders = vec!["?"; group_ids.len()].join(", ");
                let sql = format!("SELECT id, name FROM user_group WHERE id IN ({placeholders})");
                let mut query = sqlx::query(&sql);
                for id in &group_ids {
                    query = query.bind(id);
                }
                for row in query.fetch_all(pool).await? {
                    let id: i64 = row.try_get("id")?;
                    let name: String = row.try_get("name")?;
                    for user in entities.iter_mut().filter(|u| u.group_id == Some(id)) {
                        user.group = Some(GroupBrief {
                            id,
                            name: name.clone(),
                        });
                    }
                }
            }
        }

        if relations.contains(&"role") {
            let role_ids: Vec<i64> = entities.iter().filter_map(|u| u.role_id).collect();
            if !role_ids.is_empty() {
                let placeholders = vec!["?"; role_ids.len()].join(", ");
                let sql = format!("SELECT id, name FROM role WHERE id IN ({placeholders})");
                let mut query = sqlx::query(&sql);
                for id in &role_ids {
                    query = query.bind(id);
                }
                for row in query.fetch_all(pool).await? {
                    let id: i64 = row.try_get("id")?;
                    let name: String = row.try_get("name")?;
                    for user in entities.iter_mut().filter(|u| u.role_id == Some(id)) {
                        user.role = Some(RoleBrief {
                            id,
                            name: name.clone(),
                        });
                    }
                }
            }
        }

        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct UserCreate {
    pub name: String,
    pub password: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub avatar: Option<String>,
    pub is_active: Option<bool>,
    pub auth_info: Option<serde_json::Value>,
    pub group_id: Option<i64>,
    pub role_id: Option<i64>,
}

impl FieldSet for UserCreate {
    fn assignments(&self) -> Vec<(&'static str, SqlValue)> {
        let mut fields: Vec<(&'static str, SqlValue)> = vec![
            ("name", self.name.as_str().into()),
            ("password", self.password.as_str().into()),
        ];
        if let Some(email) = &self.email {
            fields.push(("email", email.as_str().into()));
        }
        if let Some(phone) = &self.phone {
            fields.push(("phone", phone.as_str().into()));
        }
        if let Some(avatar) = &self.avatar {
            fields.push(("avatar", avatar.as_str().into()));
        }
        if let Some(is_active) = self.is_active {
            fields.push(("is_active", is_active.into()));
        }
        if let Some(auth_info) = &self.auth_info {
            fields.push(("auth_info", SqlValue::Json(auth_info.clone())));
        }
        if let Some(group_id) = self.group_id {
            fields.push(("group_id", group_id.into()));
        }
        if let Some(role_id) = self.role_id {
            fields.push(("role_id", role_id.into()));
        }
        fields
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub password: Option<String>,
    #[serde(default, deserialize_with = "de_tri_state")]
    pub email: Option<Option<String>>,
    #[serde(default, deserialize_with = "de_tri_state")]
    pub phone: Option<Option<String>>,
    #[serde(default, deserialize_with = "de_tri_state")]
    pub avatar: Option<Option<String>>,
    pub is_active: Option<bool>,
    /// Merged into the stored map; explicit null clears it.
    #[serde(default, deserialize_with = "de_tri_state")]
    pub auth_info: Option<Option<serde_json::Value>>,
    #[serde(default, deserialize_with = "de_tri_state")]
    pub group_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "de_tri_state")]
    pub role_id: Option<Option<i64>>,
}

impl FieldSet for UserUpdate {
    fn assignments(&self) -> Vec<(&'static str, SqlValue)> {
        let mut fields: Vec<(&'static str, SqlValue)> = Vec::new();
        if let Some(name) = &self.name {
            fields.push(("name", name.as_str().into()));
        }
        if let Some(password) = &self.password {
            fields.push(("password", password.as_str().into()));
        }
        if let Some(email) = &self.email {
            fields.push(("email", email.clone().into()));
        }
        if let Some(phone) = &self.phone {
            fields.push(("phone", phone.clone().into()));
        }
        if let Some(avatar) = &self.avatar {
            fields.push(("avatar", avatar.clone().into()));
        }
        if let Some(is_active) = self.is_active {
            fields.push(("is_active", is_active.into()));
        }
        if let Some(auth_info) = &self.auth_info {
            fields.push((
                "auth_info",
                match auth_info {
                    Some(value) => SqlValue::Json(value.clone()),
                    None => SqlValue::Null,
                },
            ));
        }
        if let Some(group_id) = &self.group_id {
            fields.push(("group_id", (*group_id).into()));
        }
        if let Some(role_id) = &self.role_id {
            fields.push(("role_id", (*role_id).into()));
        }
        fields
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    pub q: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub order_by: Option<String>,
    pub order: Option<crate::orm::Order>,
    #[serde(default, deserialize_with = "de_comma_list")]
    pub id: Option<Vec<i64>>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub is_active: Option<bool>,
    pub group_id: Option<i64>,
    pub role_id: Option<i64>,
    #[serde(rename = "created_at__gte")]
    pub created_at_gte: Option<String>,
    #[serde(rename = "created_at__lte")]
    pub created_at_lte: Option<String>,
}

impl QuerySpec for UserQuery {
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
        if let Some(email) = &self.email {
            filters.push(("email".to_string(), FilterValue::Value(email.as_str().into())));
        }
        if let Some(phone) = &self.phone {
            filters.push(("phone".to_string(), FilterValue::Value(phone.as_str().into())));
        }
        if let Some(is_active) = self.is_active {
            filters.push(("is_active".to_string(), FilterValue::Bool(is_active)));
        }
        if let Some(group_id) = self.group_id {
            filters.push(("group_id".to_string(), FilterValue::Value(group_id.into())));
        }
        if let Some(role_id) = self.role_id {
            filters.push(("role_id".to_string(), FilterValue::Value(role_id.into())));
        }
        if let Some(gte) = &self.created_at_gte {
            filters.push((
                "created_at__gte".to_string(),
                FilterValue::Value(gte.as_str().into()),
            ));
        }
        if let Some(lte) = &self.created_at_lte {
            filters.push((
                "created_at__lte".to_string(),
                FilterValue::Value(lte.as_str().into()),
            ));
        }
        filters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orm::traits::Entity;

    #[test]
    fn test_password_never_serialized() {
        let user = User {
            id: 1,
            name: "alice".into(),
            password: "$2b$12$secret".into(),
            email: Some("alice@example.com".into()),
            phone: None,
            avatar: None,
            last_login: None,
            is_active: true,
            auth_info: None,
            group_id: None,
            role_id: None,
            created_at: "2024-01-01T00:00:00Z".into(),
            updated_at: "2024-01-01T00:00:00Z".into(),
            group: None,
            role: None,
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password").is_none());
        assert_eq!(json["email"], "alice@example.com");
    }

    #[test]
    fn test_update_tri_state_fields() {
        let update: UserUpdate =
            serde_json::from_str(r#"{"email": null, "phone": "123"}"#).unwrap();
        assert_eq!(update.email, Some(None));
        assert_eq!(update.phone, Some(Some("123".to_string())));
        assert_eq!(update.avatar, None);

        let fields = update.assignments();
        let names: Vec<&str> = fields.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["email", "phone"]);
        assert!(matches!(fields[0].1, SqlValue::Null));
    }

    #[test]
    fn test_auth_info_is_mergeable() {
        assert!(matches!(
            User::field_kind("auth_info"),
            FieldKind::MergeableMap
        ));
        assert!(matches!(User::field_kind("email"), FieldKind::Scalar));
    }

    #[test]
    fn test_query_operator_filters() {
        let query: UserQuery =
            serde_urlencoded::from_str("created_at__gte=2024-01-01&is_active=true").unwrap();
        let filters = query.filters();
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[0].0, "is_active");
        assert_eq!(filters[1].0, "created_at__gte");
    }
}
