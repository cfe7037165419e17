use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 消费日志类型
pub const LOG_TYPE_CONSUME: i32 = 2;

/// 日志数据库实体
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LogEntity {
    pub id: i64,
    pub user_id: i64,
    /// Unix 时间戳，秒
    pub created_at: i64,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub log_type: i32,
    pub content: String,
    pub username: String,
    pub token_name: String,
    pub model_name: String,
    pub quota: i64,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub use_time: i32,
    pub is_stream: bool,
    pub channel_id: i64,
    #[sqlx(rename = "group")]
    #[serde(rename = "group")]
    pub group_name: String,
    pub ip: String,
}

/// 用量统计
#[derive(Debug, Clone, Default, PartialEq, Serialize, FromRow)]
pub struct UsageStat {
    pub quota: i64,
    pub rpm: i64,
    pub tpm: i64,
}
