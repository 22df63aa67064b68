//! Menu entity: frontend route tree.
//!
//! Menus form a forest through `parent_id`; deleting a parent cascades to
//! its children. Ids are assigned by the client so the frontend route table
//! stays stable across environments.

use serde::{Deserialize, Serialize};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::db::Database;
use crate::i18n::Locale;
use crate::orm::FilterValue;
use crate::orm::traits::{
    ColumnDef, Entity, FieldKind, FieldSet, QuerySpec, RelationLoader, SqlValue,
};

use super::{de_comma_list, de_tri_state};

#[derive(Debug, Clone, Serialize)]
pub struct Menu {
    pub id: i64,
    pub name: String,
    pub hidden: bool,
    pub redirect: String,
    pub hide_children_in_menu: bool,
    pub sort_order: i64,
    pub title: String,
    pub icon: Option<String>,
    pub keep_alive: bool,
    pub hidden_header_content: bool,
    /// Permission ids gating this route, stored as a JSON array.
    pub permission: Option<Vec<i64>>,
    pub parent_id: Option<i64>,
}

static COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("id", "INTEGER").primary_key(),
    ColumnDef::new("name", "TEXT").unique(),
    ColumnDef::new("hidden", "INTEGER").default_expr("0"),
    ColumnDef::new("redirect", "TEXT"),
    ColumnDef::new("hide_children_in_menu", "INTEGER").default_expr("0"),
    ColumnDef::new("sort_order", "INTEGER"),
    ColumnDef::new("title", "TEXT"),
    ColumnDef::new("icon", "TEXT").nullable(),
    ColumnDef::new("keep_alive", "INTEGER").default_expr("0"),
    ColumnDef::new("hidden_header_content", "INTEGER").default_expr("0"),
    ColumnDef::new("permission", "TEXT").nullable(),
    ColumnDef::new("parent_id", "INTEGER")
        .nullable()
        .references("menu", "id")
        .on_delete("CASCADE"),
];

impl Entity for Menu {
    const TABLE_NAME: &'static str = "menu";

    fn visible_name(locale: Locale) -> &'static str {
        match locale {
            Locale::EnUs => "Menu",
            Locale::ZhCn => "菜单",
        }
    }

    fn columns() -> &'static [ColumnDef] {
        COLUMNS
    }

    fn field_kind(field: &str) -> FieldKind {
        match field {
            "permission" => FieldKind::List,
            _ => FieldKind::Scalar,
        }
    }

    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let permission: Option<String> = row.try_get("permission")?;
        let permission = permission
            .as_deref()
            .map(|raw| serde_json::from_str::<Vec<i64>>(raw).unwrap_or_default());
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            hidden: row.try_get("hidden")?,
            redirect: row.try_get("redirect")?,
            hide_children_in_menu: row.try_get("hide_children_in_menu")?,
            sort_order: row.try_get("sort_order")?,
            title: row.try_get("title")?,
            icon: row.try_get("icon")?,
            keep_alive: row.try_get("keep_alive")?,
            hidden_header_content: row.try_get("hidden_header_content")?,
            permission,
            parent_id: row.try_get("parent_id")?,
        })
    }

    fn id_value(&self) -> SqlValue {
        self.id.into()
    }

    fn field_value(&self, field: &str) -> Option<SqlValue> {
        match field {
            "id" => Some(self.id.into()),
            "name" => Some(self.name.as_str().into()),
            "hidden" => Some(self.hidden.into()),
            "redirect" => Some(self.redirect.as_str().into()),
            "hide_children_in_menu" => Some(self.hide_children_in_menu.into()),
            "sort_order" => Some(self.sort_order.into()),
            "title" => Some(self.title.as_str().into()),
            "icon" => Some(self.icon.clone().into()),
            "keep_alive" => Some(self.keep_alive.into()),
            "hidden_header_content" => Some(self.hidden_header_content.into()),
            "permission" => Some(match &self.permission {
                Some(ids) => SqlValue::Json(serde_json::json!(ids)),
                None => SqlValue::Null,
            }),
            "parent_id" => Some(self.parent_id.into()),
            _ => None,
        }
    }
}

impl RelationLoader for Menu {
    async fn load_relations(
        _entities: &mut [Self],
        _pool: &Database,
        _relations: &[&str],
    ) -> Result<(), sqlx::Error> {
        // Children are assembled by `menu_tree`, not per-row loads.
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MenuCreate {
    pub id: i64,
    pub name: String,
    pub hidden: bool,
    pub redirect: String,
    #[serde(alias = "hideChildrenInMenu")]
    pub hide_children_in_menu: bool,
    #[serde(alias = "order")]
    pub sort_order: i64,
    pub title: String,
    pub icon: Option<String>,
    #[serde(alias = "keepAlive")]
    pub keep_alive: bool,
    #[serde(alias = "hiddenHeaderContent")]
    pub hidden_header_content: bool,
    #[serde(default)]
    pub permission: Vec<i64>,
    pub parent_id: Option<i64>,
}

impl FieldSet for MenuCreate {
    fn assignments(&self) -> Vec<(&'static str, SqlValue)> {
        vec![
            ("id", self.id.into()),
            ("name", self.name.as_str().into()),
            ("hidden", self.hidden.into()),
            ("redirect", self.redirect.as_str().into()),
            ("hide_children_in_menu", self.hide_children_in_menu.into()),
            ("sort_order", self.sort_order.into()),
            ("title", self.title.as_str().into()),
            ("icon", self.icon.clone().into()),
            ("keep_alive", self.keep_alive.into()),
            ("hidden_header_content", self.hidden_header_content.into()),
            ("permission", SqlValue::Json(serde_json::json!(self.permission))),
            ("parent_id", self.parent_id.into()),
        ]
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct MenuUpdate {
    pub name: Option<String>,
    pub hidden: Option<bool>,
    pub redirect: Option<String>,
    #[serde(alias = "hideChildrenInMenu")]
    pub hide_children_in_menu: Option<bool>,
    #[serde(alias = "order")]
    pub sort_order: Option<i64>,
    pub title: Option<String>,
    #[serde(default, deserialize_with = "de_tri_state")]
    pub icon: Option<Option<String>>,
    #[serde(alias = "keepAlive")]
    pub keep_alive: Option<bool>,
    #[serde(alias = "hiddenHeaderContent")]
    pub hidden_header_content: Option<bool>,
    pub permission: Option<Vec<i64>>,
    #[serde(default, deserialize_with = "de_tri_state")]
    pub parent_id: Option<Option<i64>>,
}

impl FieldSet for MenuUpdate {
    fn assignments(&self) -> Vec<(&'static str, SqlValue)> {
        let mut fields: Vec<(&'static str, SqlValue)> = Vec::new();
        if let Some(name) = &self.name {
            fields.push(("name", name.as_str().into()));
        }
        if let Some(hidden) = self.hidden {
            fields.push(("hidden", hidden.into()));
        }
        if let Some(redirect) = &self.redirect {
            fields.push(("redirect", redirect.as_str().into()));
        }
        if let Some(hide) = self.hide_children_in_menu {
            fields.push(("hide_children_in_menu", hide.into()));
        }
        if let Some(sort_order) = self.sort_order {
            fields.push(("sort_order", sort_order.into()));
        }
        if let Some(title) = &self.title {
            fields.push(("title", title.as_str().into()));
        }
        if let Some(icon) = &self.icon {
            fields.push(("icon", icon.clone().into()));
        }
        if let Some(keep_alive) = self.keep_alive {
            fields.push(("keep_alive", keep_alive.into()));
        }
        if let Some(hidden_header) = self.hidden_header_content {
            fields.push(("hidden_header_content", hidden_header.into()));
        }
        if let Some(permission) = &self.permission {
            fields.push(("permission", SqlValue::Json(serde_json::json!(permission))));
        }
        if let Some(parent_id) = &self.parent_id {
            fields.push(("parent_id", (*parent_id).into()));
        }
        fields
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct MenuQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub order_by: Option<String>,
    pub order: Option<crate::orm::Order>,
    #[serde(default, deserialize_with = "de_comma_list")]
    pub id: Option<Vec<i64>>,
    pub name: Option<String>,
    pub hidden: Option<bool>,
    pub parent_id: Option<i64>,
}

impl QuerySpec for MenuQuery {
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
        if let Some(hidden) = self.hidden {
            filters.push(("hidden".to_string(), FilterValue::Bool(hidden)));
        }
        if let Some(parent_id) = self.parent_id {
            filters.push(("parent_id".to_string(), FilterValue::Value(parent_id.into())));
        }
        filters
    }
}

/// Nested menu node returned by the tree endpoint.
#[derive(Debug, Serialize)]
pub struct MenuTree {
    pub id: i64,
    pub name: String,
    pub redirect: String,
    pub meta: MenuMeta,
    pub children: Vec<MenuTree>,
}

#[derive(Debug, Serialize)]
pub struct MenuMeta {
    pub title: String,
    pub icon: Option<String>,
    pub hidden: bool,
    #[serde(rename = "keepAlive")]
    pub keep_alive: bool,
    #[serde(rename = "hiddenHeaderContent")]
    pub hidden_header_content: bool,
    pub permission: Vec<i64>,
    #[serde(rename = "hideChildrenInMenu")]
    pub hide_children_in_menu: bool,
}

/// Assemble the flat menu list into a forest ordered by `sort_order`.
/// Orphans (dangling parent_id) are treated as roots rather than dropped.
pub fn menu_tree(mut menus: Vec<Menu>) -> Vec<MenuTree> {
    menus.sort_by_key(|m| m.sort_order);
    let known: std::collections::HashSet<i64> = menus.iter().map(|m| m.id).collect();

    fn build(menus: &[Menu], parent: Option<i64>, known: &std::collections::HashSet<i64>) -> Vec<MenuTree> {
        menus
            .iter()
            .filter(|m| {
                match (m.parent_id, parent) {
                    (Some(pid), None) => !known.contains(&pid),
                    (pid, parent) => pid == parent,
                }
            })
            .map(|m| MenuTree {
                id: m.id,
                name: m.name.clone(),
                redirect: m.redirect.clone(),
                meta: MenuMeta {
                    title: m.title.clone(),
                    icon: m.icon.clone(),
                    hidden: m.hidden,
                    keep_alive: m.keep_alive,
                    hidden_header_content: m.hidden_header_content,
                    permission: m.permission.clone().unwrap_or_default(),
                    hide_children_in_menu: m.hide_children_in_menu,
                },
                children: build(menus, Some(m.id), known),
            })
            .collect()
    }

    build(&menus, None, &known)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn menu(id: i64, parent: Option<i64>, sort_order: i64) -> Menu {
        Menu {
            id,
            name: format!("menu-{id}"),
            hidden: false,
            redirect: String::new(),
            hide_children_in_menu: false,
            sort_order,
            title: format!("Menu {id}"),
            icon: None,
            keep_alive: false,
            hidden_header_content: false,
            permission: None,
            parent_id: parent,
        }
    }

    #[test]
    fn test_tree_nesting_and_order() {
        let tree = menu_tree(vec![
            menu(2, None, 2),
            menu(1, None, 1),
            menu(3, Some(1), 1),
            menu(4, Some(1), 0),
        ]);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].id, 1);
        assert_eq!(tree[1].id, 2);
        let children: Vec<i64> = tree[0].children.iter().map(|c| c.id).collect();
        assert_eq!(children, vec![4, 3]);
    }

    #[test]
    fn test_orphan_becomes_root() {
        let tree = menu_tree(vec![menu(5, Some(99), 0)]);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].id, 5);
    }
}
