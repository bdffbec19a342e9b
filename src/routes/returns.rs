use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::{JsonRejection, QueryRejection}},
    http::StatusCode,
    routing::get,
};
use uuid::Uuid;

use crate::{
    dto::returns::{CreateReturnRequest, ReturnList, UpdateReturnRequest},
    error::AppResult,
    middleware::auth::AuthUser,
    models::ReturnRequest,
    response::ApiResponse,
    routes::params::StatusQuery,
    services::return_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_returns).post(create_return))
        .route("/{id}", get(get_return).patch(update_return))
}

#[utoipa::path(
    post,
    path = "/api/returns",
    request_body = CreateReturnRequest,
    responses(
        (status = 201, description = "Return requested", body = ApiResponse<ReturnRequest>),
        (status = 400, description = "Order not delivered or quantity too high"),
        (status = 422, description = "Missing or malformed field")
    ),
    security(("bearer_auth" = [])),
    tag = "Returns"
)]
pub async fn create_return(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<CreateReturnRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<ApiResponse<ReturnRequest>>)> {
    let Json(payload) = payload?;
    let resp = return_service::create_return(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    get,
    path = "/api/returns",
    params(StatusQuery),
    responses(
        (status = 200, description = "Caller's return requests", body = ApiResponse<ReturnList>)
    ),
    security(("bearer_auth" = [])),
    tag = "Returns"
)]
pub async fn list_returns(
    State(state): State<AppState>,
    user: AuthUser,
    query: Result<Query<StatusQuery>, QueryRejection>,
) -> AppResult<Json<ApiResponse<ReturnList>>> {
    let Query(query) = query?;
    let resp = return_service::list_my_returns(&state, &user, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/returns/{id}",
    params(("id" = Uuid, Path, description = "Return request ID")),
    responses(
        (status = 200, description = "Return request", body = ApiResponse<ReturnRequest>),
        (status = 404, description = "Not Found")
    ),
    security(("bearer_auth" = [])),
    tag = "Returns"
)]
pub async fn get_return(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ReturnRequest>>> {
    let resp = return_service::get_return(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    patch,
    path = "/api/returns/{id}",
    params(("id" = Uuid, Path, description = "Return request ID")),
    request_body = UpdateReturnRequest,
    responses(
        (status = 200, description = "Return status moved", body = ApiResponse<ReturnRequest>),
        (status = 400, description = "Invalid transition"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Returns"
)]
pub async fn update_return(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    payload: Result<Json<UpdateReturnRequest>, JsonRejection>,
) -> AppResult<Json<ApiResponse<ReturnRequest>>> {
    let Json(payload) = payload?;
    let resp = return_service::update_return(&state, &user, id, payload).await?;
    Ok(Json(resp))
}
