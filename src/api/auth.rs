use crate::api::AppState;
use crate::api::schemas::auth::{AuthResponse, Credentials};
use crate::error::Result;
use axum::{Json, extract::State, response::IntoResponse};

pub async fn register(State(state): State<AppState>, Json(payload): Json<Credentials>) -> Result<impl IntoResponse> {
    state.auth_service.register(payload.username, payload.password).await?;
    Ok(Json(AuthResponse::ok()))
}

pub async fn login(State(state): State<AppState>, Json(payload): Json<Credentials>) -> Result<impl IntoResponse> {
    let token = state.auth_service.login(payload.username, payload.password).await?;
    Ok(Json(AuthResponse::with_token(token)))
}
