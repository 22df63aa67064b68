//! Persisted entity types and their request/response schemas.
//!
//! Each entity implements the `orm` traits by hand: a static column
//! registry, row decoding, a field accessor, and relation loaders.

pub mod group;
pub mod menu;
pub mod permission;
pub mod role;
pub mod user;

pub use group::{Group, GroupBrief, GroupCreate, GroupQuery, GroupUpdate};
pub use menu::{Menu, MenuCreate, MenuQuery, MenuTree, MenuUpdate, menu_tree};
pub use permission::{Permission, PermissionCreate, PermissionQuery};
pub use role::{Role, RoleBrief, RoleCreate, RoleQuery, RoleUpdate};
pub use user::{User, UserCreate, UserQuery, UserUpdate};

use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Deserializer};

/// Deserialize `a,b,c` (or a single item) into a list. Query strings carry
/// id lists this way.
pub(crate) fn de_comma_list<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    let mut items = Vec::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        items.push(part.parse::<T>().map_err(serde::de::Error::custom)?);
    }
    Ok(Some(items))
}

/// Tri-state deserializer: a missing field stays `None`, an explicit JSON
/// null becomes `Some(None)`, a value becomes `Some(Some(v))`.
pub(crate) fn de_tri_state<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct CommaQuery {
        #[serde(default, deserialize_with = "super::de_comma_list")]
        id: Option<Vec<i64>>,
    }

    #[derive(Deserialize)]
    struct TriState {
        #[serde(default, deserialize_with = "super::de_tri_state")]
        email: Option<Option<String>>,
    }

    #[test]
    fn test_comma_list() {
        let q: CommaQuery = serde_urlencoded::from_str("id=1,2,3").unwrap();
        assert_eq!(q.id, Some(vec![1, 2, 3]));
        let q: CommaQuery = serde_urlencoded::from_str("id=7").unwrap();
        assert_eq!(q.id, Some(vec![7]));
        let q: CommaQuery = serde_urlencoded::from_str("").unwrap();
        assert_eq!(q.id, None);
        // an explicitly empty list filters to nothing downstream
        let q: CommaQuery = serde_urlencoded::from_str("id=").unwrap();
        assert_eq!(q.id, Some(vec![]));
    }

    #[test]
    fn test_tri_state() {
        let t: TriState = serde_json::from_str("{}").unwrap();
        assert_eq!(t.email, None);
        let t: TriState = serde_json::from_str(r#"{"email": null}"#).unwrap();
        assert_eq!(t.email, Some(None));
        let t: TriState = serde_json::from_str(r#"{"email": "a@b.c"}"#).unwrap();
        assert_eq!(t.email, Some(Some("a@b.c".to_string())));
    }
}
