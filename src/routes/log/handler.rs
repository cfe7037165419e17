use axum::{
    Extension, Json,
    extract::{Query, State},
};
use chrono::Utc;

use crate::AppState;
use crate::cache::RankingSnapshot;
use crate::database::models::{LogEntity, UsageStat};
use crate::database::repositories::log::{LogFilter, Page, PageQuery};
use crate::error::AppError;
use crate::result::ApiResult;
use crate::utils::{Claims, success_to_api_response};

use super::model::{DEFAULT_DELETE_BATCH_SIZE, DeleteLogsQuery, DeleteLogsResponse, SearchQuery};

type ApiResponse<T> = Result<Json<ApiResult<T>>, AppError>;

/// 当日排行榜，非管理员看到脱敏 IP
#[axum::debug_handler]
pub async fn get_ranking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResponse<RankingSnapshot> {
    let snapshot = state.ranking.snapshot(claims.is_admin()).await?;
    Ok(success_to_api_response(snapshot))
}

#[axum::debug_handler]
pub async fn get_all_logs(
    State(state): State<AppState>,
    Query(filter): Query<LogFilter>,
    Query(page): Query<PageQuery>,
) -> ApiResponse<Page<LogEntity>> {
    let logs = state.logs.list_logs(&filter, None, page).await?;
    Ok(success_to_api_response(logs))
}

#[axum::debug_handler]
pub async fn get_user_logs(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(filter): Query<LogFilter>,
    Query(page): Query<PageQuery>,
) -> ApiResponse<Page<LogEntity>> {
    let filter = own_logs(filter);
    let logs = state.logs.list_logs(&filter, Some(claims.sub), page).await?;
    Ok(success_to_api_response(logs))
}

#[axum::debug_handler]
pub async fn search_all_logs(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResponse<Vec<LogEntity>> {
    let logs = state.logs.search_logs(&query.keyword, None).await?;
    Ok(success_to_api_response(logs))
}

#[axum::debug_handler]
pub async fn search_user_logs(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<SearchQuery>,
) -> ApiResponse<Vec<LogEntity>> {
    let logs = state
        .logs
        .search_logs(&query.keyword, Some(claims.sub))
        .await?;
    Ok(success_to_api_response(logs))
}

#[axum::debug_handler]
pub async fn get_log_stat(
    State(state): State<AppState>,
    Query(filter): Query<LogFilter>,
) -> ApiResponse<UsageStat> {
    let stat = state
        .logs
        .sum_usage(&filter, None, Utc::now().timestamp())
        .await?;
    Ok(success_to_api_response(stat))
}

#[axum::debug_handler]
pub async fn get_user_log_stat(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(filter): Query<LogFilter>,
) -> ApiResponse<UsageStat> {
    let filter = own_logs(filter);
    let stat = state
        .logs
        .sum_usage(&filter, Some(claims.sub), Utc::now().timestamp())
        .await?;
    Ok(success_to_api_response(stat))
}

#[axum::debug_handler]
pub async fn delete_history_logs(
    State(state): State<AppState>,
    Query(query): Query<DeleteLogsQuery>,
) -> ApiResponse<DeleteLogsResponse> {
    if query.target_timestamp <= 0 {
        return Err(AppError::BadRequest("target timestamp is required".into()));
    }
    let batch_size = query.batch_size.unwrap_or(DEFAULT_DELETE_BATCH_SIZE);
    let deleted = state
        .logs
        .delete_old_logs(query.target_timestamp, batch_size)
        .await?;
    Ok(success_to_api_response(DeleteLogsResponse { deleted }))
}

/// 普通用户只能按自己的 user_id 查询，忽略用户名过滤
fn own_logs(filter: LogFilter) -> LogFilter {
    LogFilter {
        username: String::new(),
        ..filter
    }
}
