//! Menu CRUD handlers plus the nested tree endpoint.

use axum::Json;
use axum::extract::{Path, Query, State};

use crate::app::AppState;
use crate::auth::AuthUser;
use crate::entities::{Menu, MenuCreate, MenuQuery, MenuTree, MenuUpdate, menu_tree};
use crate::errors::AppError;
use crate::i18n::Locale;
use crate::orm::Repository;

use super::{BaseResponse, IdResponse, ListData};

pub async fn list(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(query): Query<MenuQuery>,
) -> Result<Json<BaseResponse<ListData<Menu>>>, AppError> {
    let repo = Repository::<Menu>::new(state.constraints.clone());
    let (total, items) = repo.list_and_count(&state.db, &query, &[]).await?;
    Ok(BaseResponse::ok(ListData { total, items }))
}

/// Full menu forest, nested by `parent_id` and ordered by `sort_order`.
pub async fn tree(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> Result<Json<BaseResponse<Vec<MenuTree>>>, AppError> {
    let repo = Repository::<Menu>::new(state.constraints.clone());
    let (_, menus) = repo
        .list_and_count(&state.db, &MenuQuery::default(), &[])
        .await?;
    Ok(BaseResponse::ok(menu_tree(menus)))
}

pub async fn get_one(
    State(state): State<AppState>,
    locale: Locale,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<BaseResponse<Menu>>, AppError> {
    let repo = Repository::<Menu>::new(state.constraints.clone());
    let menu = repo.get_one_or_404(&state.db, locale, id.into(), &[]).await?;
    Ok(BaseResponse::ok(menu))
}

pub async fn create(
    State(state): State<AppState>,
    locale: Locale,
    _auth: AuthUser,
    Json(body): Json<MenuCreate>,
) -> Result<Json<BaseResponse<Menu>>, AppError> {
    let repo = Repository::<Menu>::new(state.constraints.clone());
    let menu = repo.create(&state.db, locale, &body, &[]).await?;
    Ok(BaseResponse::ok(menu))
}

pub async fn update(
    State(state): State<AppState>,
    locale: Locale,
    _auth: AuthUser,
    Path(id): Path<i64>,
    Json(body): Json<MenuUpdate>,
) -> Result<Json<BaseResponse<Menu>>, AppError> {
    if body.parent_id == Some(Some(id)) {
        return Err(AppError::Validation(
            "a menu cannot be its own parent".to_string(),
        ));
    }
    let repo = Repository::<Menu>::new(state.constraints.clone());
    let menu = repo.get_one_or_404(&state.db, locale, id.into(), &[]).await?;
    let menu = repo.update(&state.db, locale, &menu, &body, &[]).await?;
    Ok(BaseResponse::ok(menu))
}

pub async fn remove(
    State(state): State<AppState>,
    locale: Locale,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<BaseResponse<IdResponse<i64>>>, AppError> {
    let repo = Repository::<Menu>::new(state.constraints.clone());
    let menu = repo.get_one_or_404(&state.db, locale, id.into(), &[]).await?;
    // Children go with it through the declared cascade.
    repo.delete(&state.db, &menu).await?;
    Ok(BaseResponse::ok(IdResponse { id }))
}
