use axum::{
    Json,
    extract::{Path, State},
};

use crate::AppState;
use crate::error::{AppError, ValidationError};
use crate::result::ApiResult;
use crate::setting::SettingRegistry;
use crate::utils::success_to_api_response;

use super::model::{OptionInfo, OptionPayload};

type ApiResponse<T> = Result<Json<ApiResult<T>>, AppError>;

fn ensure_known(key: &str) -> Result<(), AppError> {
    if SettingRegistry::is_known(key) {
        Ok(())
    } else {
        Err(ValidationError::UnknownOption(key.to_string()).into())
    }
}

#[axum::debug_handler]
pub async fn get_option(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResponse<OptionInfo> {
    ensure_known(&key)?;
    let value = state.settings.option_json(&key).ok_or(AppError::Internal)?;
    Ok(success_to_api_response(OptionInfo { key, value }))
}

/// 只校验不保存
#[axum::debug_handler]
pub async fn validate_option(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(payload): Json<OptionPayload>,
) -> ApiResponse<()> {
    ensure_known(&key)?;
    state.settings.validate(&key, &payload.value)?;
    Ok(success_to_api_response(()))
}

#[axum::debug_handler]
pub async fn update_option(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(payload): Json<OptionPayload>,
) -> ApiResponse<OptionInfo> {
    ensure_known(&key)?;
    state.settings.update(&key, &payload.value).await?;
    Ok(success_to_api_response(OptionInfo {
        key,
        value: payload.value,
    }))
}
