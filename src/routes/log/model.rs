use serde::{Deserialize, Serialize};

/// 删除日志时每批条数
pub const DEFAULT_DELETE_BATCH_SIZE: i64 = 100;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SearchQuery {
    pub keyword: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DeleteLogsQuery {
    pub target_timestamp: i64,
    pub batch_size: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct DeleteLogsResponse {
    pub deleted: u64,
}
