use axum::{Extension, Json, extract::State};

use crate::AppState;
use crate::result::ApiResult;
use crate::utils::{Claims, success_to_api_response};

/// 全部分组名，管理端使用
#[axum::debug_handler]
pub async fn get_groups(State(state): State<AppState>) -> Json<ApiResult<Vec<String>>> {
    success_to_api_response(state.pricing.list_all_group_names())
}

/// 当前用户可用分组及其倍率
#[axum::debug_handler]
pub async fn get_user_groups(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> impl axum::response::IntoResponse {
    let groups = state
        .pricing
        .resolve_usable_groups(&claims.group, claims.sub)
        .await;
    success_to_api_response(groups)
}

#[axum::debug_handler]
pub async fn get_auto_groups(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Json<ApiResult<Vec<String>>> {
    success_to_api_response(state.pricing.resolver().auto_groups(&claims.group))
}
