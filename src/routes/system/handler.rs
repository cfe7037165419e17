use axum::{Json, extract::State};

use crate::AppState;
use crate::result::ApiResult;
use crate::service::pricing::SystemStats;
use crate::utils::success_to_api_response;

/// 首页展示的系统 RPM 与默认分组倍率，无需登录
#[axum::debug_handler]
pub async fn get_system_stats(State(state): State<AppState>) -> Json<ApiResult<SystemStats>> {
    success_to_api_response(state.pricing.system_stats().await)
}
