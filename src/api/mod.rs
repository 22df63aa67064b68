//! REST surface: response envelopes, the protected-route manifest and the
//! router.
//!
//! Every endpoint responds with the same envelope `{ code, data, message }`
//! so clients have a single decode path for success and failure.

pub mod auth;
pub mod groups;
pub mod health;
pub mod menus;
pub mod permissions;
pub mod roles;
pub mod users;

use axum::Router;
use axum::routing::get;
use serde::Serialize;

use crate::app::AppState;

#[derive(Debug, Serialize)]
pub struct BaseResponse<T: Serialize> {
    pub code: u16,
    pub data: T,
    pub message: String,
}

impl<T: Serialize> BaseResponse<T> {
    pub fn ok(data: T) -> axum::Json<Self> {
        axum::Json(Self {
            code: 200,
            data,
            message: "success".to_string(),
        })
    }
}

/// List payload: total count of the filtered set alongside the page.
#[derive(Debug, Serialize)]
pub struct ListData<T: Serialize> {
    pub total: i64,
    pub items: Vec<T>,
}

#[derive(Debug, Serialize)]
pub struct IdResponse<T: Serialize> {
    pub id: T,
}

/// One guarded route. Seeded into the permission table at startup; the auth
/// extractor matches requests against these (url, method) pairs.
#[derive(Debug, Clone, Copy)]
pub struct RouteDef {
    pub name: &'static str,
    pub url: &'static str,
    pub method: &'static str,
    pub tag: &'static str,
}

const fn route(
    name: &'static str,
    url: &'static str,
    method: &'static str,
    tag: &'static str,
) -> RouteDef {
    RouteDef {
        name,
        url,
        method,
        tag,
    }
}

pub const PROTECTED_ROUTES: &[RouteDef] = &[
    route("list_users", "/api/v1/users", "GET", "User"),
    route("create_user", "/api/v1/users", "POST", "User"),
    route("get_user", "/api/v1/users/{id}", "GET", "User"),
    route("update_user", "/api/v1/users/{id}", "PATCH", "User"),
    route("delete_user", "/api/v1/users/{id}", "DELETE", "User"),
    route("list_groups", "/api/v1/groups", "GET", "Group"),
    route("create_group", "/api/v1/groups", "POST", "Group"),
    route("get_group", "/api/v1/groups/{id}", "GET", "Group"),
    route("update_group", "/api/v1/groups/{id}", "PATCH", "Group"),
    route("delete_group", "/api/v1/groups/{id}", "DELETE", "Group"),
    route("list_roles", "/api/v1/roles", "GET", "Role"),
    route("create_role", "/api/v1/roles", "POST", "Role"),
    route("get_role", "/api/v1/roles/{id}", "GET", "Role"),
    route("update_role", "/api/v1/roles/{id}", "PATCH", "Role"),
    route("delete_role", "/api/v1/roles/{id}", "DELETE", "Role"),
    route("list_permissions", "/api/v1/permissions", "GET", "Permission"),
    route("get_permission", "/api/v1/permissions/{id}", "GET", "Permission"),
    route("list_menus", "/api/v1/menus", "GET", "Menu"),
    route("create_menu", "/api/v1/menus", "POST", "Menu"),
    route("get_menu", "/api/v1/menus/{id}", "GET", "Menu"),
    route("update_menu", "/api/v1/menus/{id}", "PATCH", "Menu"),
    route("delete_menu", "/api/v1/menus/{id}", "DELETE", "Menu"),
];

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .route("/api/v1/auth/login", axum::routing::post(auth::login))
        .route("/api/v1/auth/refresh", axum::routing::post(auth::refresh))
        .route("/api/v1/auth/me", get(auth::me))
        .route("/api/v1/users", get(users::list).post(users::create))
        .route(
            "/api/v1/users/{id}",
            get(users::get_one).patch(users::update).delete(users::remove),
        )
        .route("/api/v1/groups", get(groups::list).post(groups::create))
        .route(
            "/api/v1/groups/{id}",
            get(groups::get_one)
                .patch(groups::update)
                .delete(groups::remove),
        )
        .route("/api/v1/roles", get(roles::list).post(roles::create))
        .route(
            "/api/v1/roles/{id}",
            get(roles::get_one).patch(roles::update).delete(roles::remove),
        )
        .route("/api/v1/permissions", get(permissions::list))
        .route("/api/v1/permissions/{id}", get(permissions::get_one))
        .route("/api/v1/menus", get(menus::list).post(menus::create))
        .route("/api/v1/menus/tree", get(menus::tree))
        .route(
            "/api/v1/menus/{id}",
            get(menus::get_one).patch(menus::update).delete(menus::remove),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_manifest_is_unique() {
        for (i, a) in PROTECTED_ROUTES.iter().enumerate() {
            for b in &PROTECTED_ROUTES[i + 1..] {
                assert!(
                    !(a.url == b.url && a.method == b.method),
                    "duplicate route {} {}",
                    a.method,
                    a.url
                );
                assert_ne!(a.name, b.name, "duplicate route name {}", a.name);
            }
        }
    }
}
