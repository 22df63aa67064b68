//! Group CRUD handlers.

use axum::Json;
use axum::extract::{Path, Query, State};

use crate::app::AppState;
use crate::auth::AuthUser;
use crate::entities::{Group, GroupCreate, GroupQuery, GroupUpdate};
use crate::errors::AppError;
use crate::i18n::Locale;
use crate::orm::{Entity, Repository};

use super::{BaseResponse, IdResponse, ListData};

const RELATIONS: &[&str] = &["role", "user_count"];

pub async fn list(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(query): Query<GroupQuery>,
) -> Result<Json<BaseResponse<ListData<Group>>>, AppError> {
    let repo = Repository::<Group>::new(state.constraints.clone());
    let (total, items) = repo.list_and_count(&state.db, &query, RELATIONS).await?;
    Ok(BaseResponse::ok(ListData { total, items }))
}

pub async fn get_one(
    State(state): State<AppState>,
    locale: Locale,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<BaseResponse<Group>>, AppError> {
    let repo = Repository::<Group>::new(state.constraints.clone());
    let group = repo
        .get_one_or_404(&state.db, locale, id.into(), RELATIONS)
        .await?;
    Ok(BaseResponse::ok(group))
}

pub async fn create(
    State(state): State<AppState>,
    locale: Locale,
    _auth: AuthUser,
    Json(body): Json<GroupCreate>,
) -> Result<Json<BaseResponse<Group>>, AppError> {
    let repo = Repository::<Group>::new(state.constraints.clone());
    let created = repo.create(&state.db, locale, &body, &[]).await?;
    let group = repo
        .get_one_or_404(&state.db, locale, created.id_value(), RELATIONS)
        .await?;
    Ok(BaseResponse::ok(group))
}

pub async fn update(
    State(state): State<AppState>,
    locale: Locale,
    _auth: AuthUser,
    Path(id): Path<i64>,
    Json(body): Json<GroupUpdate>,
) -> Result<Json<BaseResponse<Group>>, AppError> {
    let repo = Repository::<Group>::new(state.constraints.clone());
    let group = repo.get_one_or_404(&state.db, locale, id.into(), &[]).await?;
    repo.update(&state.db, locale, &group, &body, &[]).await?;
    let group = repo
        .get_one_or_404(&state.db, locale, id.into(), RELATIONS)
        .await?;
    Ok(BaseResponse::ok(group))
}

pub async fn remove(
    State(state): State<AppState>,
    locale: Locale,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<BaseResponse<IdResponse<i64>>>, AppError> {
    let repo = Repository::<Group>::new(state.constraints.clone());
    let group = repo.get_one_or_404(&state.db, locale, id.into(), &[]).await?;

    // RESTRICT at the storage level would also stop this, but the check here
    // produces a readable message instead of a 500.
    let members: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user WHERE group_id = ?")
        .bind(id)
        .fetch_one(&state.db)
        .await?;
    if members > 0 {
        return Err(AppError::Validation(format!(
            "group still has {members} member(s)"
        )));
    }

    repo.delete(&state.db, &group).await?;
    Ok(BaseResponse::ok(IdResponse { id }))
}
