use axum::Json;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::result::ApiResult;
use crate::utils::error_codes;

/// 管理端配置校验错误，提交前拒绝，旧配置保持生效
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("invalid JSON: {0}")]
    Malformed(String),

    #[error("rpm_window_minutes must be >= 1")]
    WindowTooSmall,

    #[error("rpm_window_minutes must be <= {max}")]
    WindowTooLarge { max: i64 },

    #[error("group {group} time_ranges[{index}]: hour must be 0-23 for start, 0-24 for end")]
    HourOutOfRange { group: String, index: usize },

    #[error("group {group} {field}[{index}]: ratio must be >= 0")]
    NegativeRangeRatio {
        group: String,
        field: &'static str,
        index: usize,
    },

    #[error("group {group} rpm_ranges[{index}]: min_rpm must be >= 0")]
    NegativeMinRpm { group: String, index: usize },

    #[error("group {group} rpm_ranges[{index}]: max_rpm must be > min_rpm or -1")]
    MaxRpmNotAbove { group: String, index: usize },

    #[error("ratio of group {0} must be >= 0")]
    NegativeGroupRatio(String),

    #[error("usable group directive {directive:?} of group {group} is malformed")]
    MalformedDirective { group: String, directive: String },

    #[error("unknown option {0}")]
    UnknownOption(String),
}

impl ValidationError {
    pub fn malformed(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error")]
    Internal,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                error_codes::AUTH_FAILED,
                "未授权访问".to_string(),
            ),
            AppError::Forbidden => (
                StatusCode::FORBIDDEN,
                error_codes::PERMISSION_DENIED,
                "权限不足".to_string(),
            ),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, error_codes::VALIDATION_ERROR, msg.clone())
            }
            AppError::Validation(e) => {
                (StatusCode::BAD_REQUEST, error_codes::VALIDATION_ERROR, e.to_string())
            }
            AppError::Database(e) => {
                // 细节只进日志，不返回给调用方
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    error_codes::INTERNAL_ERROR,
                    "获取数据失败".to_string(),
                )
            }
            AppError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_codes::INTERNAL_ERROR,
                "内部服务器错误".to_string(),
            ),
        };

        (status, Json(ApiResult::<()>::error(code, &message))).into_response()
    }
}
