//! Role CRUD handlers plus many-to-many wiring for permissions and menus.
//!
//! `permission_ids` and `menu_ids` never hit the role table; they are peeled
//! off the payload and reconciled through the join tables after the row
//! write succeeds.

use axum::Json;
use axum::extract::{Path, Query, State};

use crate::app::AppState;
use crate::auth::AuthUser;
use crate::entities::role::{ADMIN_ROLE_SLUG, ROLE_RELATION_FIELDS};
use crate::entities::{Menu, Permission, Role, RoleCreate, RoleQuery, RoleUpdate};
use crate::errors::AppError;
use crate::i18n::Locale;
use crate::orm::{Entity, Repository, SqlValue};

use super::{BaseResponse, IdResponse, ListData};

const RELATIONS: &[&str] = &["permissions", "menu_ids", "user_count"];

fn reject_reserved_slug(slug: &str) -> Result<(), AppError> {
    if slug == ADMIN_ROLE_SLUG {
        return Err(AppError::Validation(format!(
            "slug '{ADMIN_ROLE_SLUG}' is reserved"
        )));
    }
    Ok(())
}

async fn reconcile(
    state: &AppState,
    locale: Locale,
    repo: &Repository<Role>,
    role: &Role,
    permission_ids: &Option<Vec<uuid::Uuid>>,
    menu_ids: &Option<Vec<i64>>,
) -> Result<(), AppError> {
    if let Some(ids) = permission_ids {
        let desired: Vec<SqlValue> = ids.iter().map(|&id| id.into()).collect();
        repo.update_relationship_field::<Permission>(
            &state.db,
            locale,
            role,
            Role::PERMISSIONS,
            &desired,
        )
        .await?;
    }
    if let Some(ids) = menu_ids {
        let desired: Vec<SqlValue> = ids.iter().map(|&id| id.into()).collect();
        repo.update_relationship_field::<Menu>(&state.db, locale, role, Role::MENUS, &desired)
            .await?;
    }
    Ok(())
}

pub async fn list(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(query): Query<RoleQuery>,
) -> Result<Json<BaseResponse<ListData<Role>>>, AppError> {
    let repo = Repository::<Role>::new(state.constraints.clone());
    let (total, items) = repo.list_and_count(&state.db, &query, RELATIONS).await?;
    Ok(BaseResponse::ok(ListData { total, items }))
}

pub async fn get_one(
    State(state): State<AppState>,
    locale: Locale,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<BaseResponse<Role>>, AppError> {
    let repo = Repository::<Role>::new(state.constraints.clone());
    let role = repo
        .get_one_or_404(&state.db, locale, id.into(), RELATIONS)
        .await?;
    Ok(BaseResponse::ok(role))
}

pub async fn create(
    State(state): State<AppState>,
    locale: Locale,
    _auth: AuthUser,
    Json(body): Json<RoleCreate>,
) -> Result<Json<BaseResponse<Role>>, AppError> {
    reject_reserved_slug(&body.slug)?;

    let repo = Repository::<Role>::new(state.constraints.clone());
    let created = repo
        .create(&state.db, locale, &body, ROLE_RELATION_FIELDS)
        .await?;
    reconcile(
        &state,
        locale,
        &repo,
        &created,
        &body.permission_ids,
        &body.menu_ids,
    )
    .await?;
    let role = repo
        .get_one_or_404(&state.db, locale, created.id_value(), RELATIONS)
        .await?;
    Ok(BaseResponse::ok(role))
}

pub async fn update(
    State(state): State<AppState>,
    locale: Locale,
    _auth: AuthUser,
    Path(id): Path<i64>,
    Json(body): Json<RoleUpdate>,
) -> Result<Json<BaseResponse<Role>>, AppError> {
    let repo = Repository::<Role>::new(state.constraints.clone());
    let role = repo.get_one_or_404(&state.db, locale, id.into(), &[]).await?;
    if role.is_admin() {
        return Err(AppError::Validation(
            "the superuser role cannot be modified".to_string(),
        ));
    }
    if let Some(slug) = &body.slug {
        reject_reserved_slug(slug)?;
    }

    repo.update(&state.db, locale, &role, &body, ROLE_RELATION_FIELDS)
        .await?;
    reconcile(
        &state,
        locale,
        &repo,
        &role,
        &body.permission_ids,
        &body.menu_ids,
    )
    .await?;
    let role = repo
        .get_one_or_404(&state.db, locale, id.into(), RELATIONS)
        .await?;
    Ok(BaseResponse::ok(role))
}

pub async fn remove(
    State(state): State<AppState>,
    locale: Locale,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<BaseResponse<IdResponse<i64>>>, AppError> {
    let repo = Repository::<Role>::new(state.constraints.clone());
    let role = repo.get_one_or_404(&state.db, locale, id.into(), &[]).await?;
    if role.is_admin() {
        return Err(AppError::Validation(
            "the superuser role cannot be deleted".to_string(),
        ));
    }

    let holders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user WHERE role_id = ?")
        .bind(id)
        .fetch_one(&state.db)
        .await?;
    if holders > 0 {
        return Err(AppError::Validation(format!(
            "role is still assigned to {holders} user(s)"
        )));
    }

    repo.delete(&state.db, &role).await?;
    Ok(BaseResponse::ok(IdResponse { id }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_slug_rejected() {
        assert!(reject_reserved_slug("admin").is_err());
        assert!(reject_reserved_slug("editor").is_ok());
    }
}
