//! User CRUD handlers.

use axum::Json;
use axum::extract::{Path, Query, State};

use crate::app::AppState;
use crate::auth::{self, AuthUser};
use crate::entities::{User, UserCreate, UserQuery, UserUpdate};
use crate::errors::AppError;
use crate::i18n::Locale;
use crate::orm::{Entity, Repository};

use super::{BaseResponse, IdResponse, ListData};

const RELATIONS: &[&str] = &["group", "role"];

pub async fn list(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(query): Query<UserQuery>,
) -> Result<Json<BaseResponse<ListData<User>>>, AppError> {
    let repo = Repository::<User>::new(state.constraints.clone());
    let (total, items) = repo.list_and_count(&state.db, &query, RELATIONS).await?;
    Ok(BaseResponse::ok(ListData { total, items }))
}

pub async fn get_one(
    State(state): State<AppState>,
    locale: Locale,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<BaseResponse<User>>, AppError> {
    let repo = Repository::<User>::new(state.constraints.clone());
    let user = repo
        .get_one_or_404(&state.db, locale, id.into(), RELATIONS)
        .await?;
    Ok(BaseResponse::ok(user))
}

pub async fn create(
    State(state): State<AppState>,
    locale: Locale,
    _auth: AuthUser,
    Json(mut body): Json<UserCreate>,
) -> Result<Json<BaseResponse<User>>, AppError> {
    if body.email.is_none() && body.phone.is_none() {
        return Err(AppError::Validation(
            "either email or phone is required".to_string(),
        ));
    }
    body.password = auth::hash_password(&body.password)?;

    let repo = Repository::<User>::new(state.constraints.clone());
    let created = repo.create(&state.db, locale, &body, &[]).await?;
    let user = repo
        .get_one_or_404(&state.db, locale, created.id_value(), RELATIONS)
        .await?;
    Ok(BaseResponse::ok(user))
}

pub async fn update(
    State(state): State<AppState>,
    locale: Locale,
    _auth: AuthUser,
    Path(id): Path<i64>,
    Json(mut body): Json<UserUpdate>,
) -> Result<Json<BaseResponse<User>>, AppError> {
    if let Some(password) = &body.password {
        body.password = Some(auth::hash_password(password)?);
    }
    let repo = Repository::<User>::new(state.constraints.clone());
    let user = repo.get_one_or_404(&state.db, locale, id.into(), &[]).await?;
    repo.update(&state.db, locale, &user, &body, &[]).await?;
    let user = repo
        .get_one_or_404(&state.db, locale, id.into(), RELATIONS)
        .await?;
    Ok(BaseResponse::ok(user))
}

pub async fn remove(
    State(state): State<AppState>,
    locale: Locale,
    AuthUser(caller): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<BaseResponse<IdResponse<i64>>>, AppError> {
    if caller.id == id {
        return Err(AppError::Validation(
            "cannot delete the current account".to_string(),
        ));
    }
    let repo = Repository::<User>::new(state.constraints.clone());
    let user = repo.get_one_or_404(&state.db, locale, id.into(), &[]).await?;
    repo.delete(&state.db, &user).await?;
    Ok(BaseResponse::ok(IdResponse { id }))
}
