use axum::Json;
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::result::ApiResult;

pub const ROLE_COMMON_USER: i32 = 1;
pub const ROLE_ADMIN_USER: i32 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,          // 用户ID
    pub username: String,  // 用户名
    pub group: String,     // 用户分组
    pub role: i32,         // 角色
    pub exp: i64,          // 过期时间
    pub iat: i64,          // 签发时间
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.role >= ROLE_ADMIN_USER
    }
}

/// 签发令牌，正式环境由认证服务签发，这里供运维工具和测试使用
pub fn generate_token(
    user_id: i64,
    username: &str,
    group: &str,
    role: i32,
    config: &Config,
) -> Result<(String, i64), jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let expiration = (now + Duration::hours(24)).timestamp();

    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        group: group.to_string(),
        role,
        exp: expiration,
        iat: now.timestamp(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )?;

    Ok((token, expiration))
}

pub fn verify_token(token: &str, config: &Config) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}

pub fn success_to_api_response<T: Serialize>(data: T) -> Json<ApiResult<T>> {
    Json(ApiResult::success(data))
}

pub mod error_codes {
    pub const SUCCESS: i32 = 0;
    pub const VALIDATION_ERROR: i32 = 1000;
    pub const AUTH_FAILED: i32 = 1002;
    pub const PERMISSION_DENIED: i32 = 1003;
    pub const INTERNAL_ERROR: i32 = 5000;
}
