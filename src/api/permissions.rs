//! Permission read endpoints. Rows are seeded from the route manifest and
//! never written through the API.

use axum::Json;
use axum::extract::{Path, Query, State};
use uuid::Uuid;

use crate::app::AppState;
use crate::auth::AuthUser;
use crate::entities::{Permission, PermissionQuery};
use crate::errors::AppError;
use crate::i18n::Locale;
use crate::orm::Repository;

use super::{BaseResponse, ListData};

pub async fn list(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(query): Query<PermissionQuery>,
) -> Result<Json<BaseResponse<ListData<Permission>>>, AppError> {
    let repo = Repository::<Permission>::new(state.constraints.clone());
    let (total, items) = repo.list_and_count(&state.db, &query, &[]).await?;
    Ok(BaseResponse::ok(ListData { total, items }))
}

pub async fn get_one(
    State(state): State<AppState>,
    locale: Locale,
    _auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<BaseResponse<Permission>>, AppError> {
    let repo = Repository::<Permission>::new(state.constraints.clone());
    let permission = repo.get_one_or_404(&state.db, locale, id.into(), &[]).await?;
    Ok(BaseResponse::ok(permission))
}
