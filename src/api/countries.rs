use axum::{
    Json,
    extract::{Path, State},
};

use crate::AppState;
use crate::countries::Country;
use crate::error::ApiError;

/// GET /api/countries
pub async fn list_countries(State(state): State<AppState>) -> Json<Vec<Country>> {
    Json(state.countries.list().await.as_ref().clone())
}

/// GET /api/countries/{code}
pub async fn get_country(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<Country>, ApiError> {
    state
        .countries
        .by_code(&code)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Unknown country code: {code}")))
}

/// GET /api/countries/dial/{dial_code}
///
/// The leading `+` is optional.
pub async fn get_country_by_dial_code(
    State(state): State<AppState>,
    Path(dial_code): Path<String>,
) -> Result<Json<Country>, ApiError> {
    let dial_code = format!("+{}", dial_code.trim().trim_start_matches('+'));
    state
        .countries
        .by_dial_code(&dial_code)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Unknown dial code: {dial_code}")))
}
