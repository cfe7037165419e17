use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 当天按用户聚合的一行，三种用户排名都从它派生
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct UserAggregateRow {
    pub username: String,
    pub display_name: String,
    /// 逗号拼接的 IP 列表
    pub ip: String,
    pub ip_count: i64,
    pub count: i64,
    pub tokens: i64,
    pub quota: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct IpCallRanking {
    pub ip: String,
    /// 使用该 IP 的用户，逗号拼接
    pub username: String,
    pub display_name: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct UserMinuteIpRanking {
    pub username: String,
    pub display_name: String,
    /// YYYY-MM-DD HH:MM
    pub minute: String,
    pub ip: String,
    pub ip_count: i64,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserCallRanking {
    pub username: String,
    pub display_name: String,
    pub ip: String,
    pub ip_count: i64,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserTokenRanking {
    pub username: String,
    pub display_name: String,
    pub tokens: i64,
    pub count: i64,
    pub quota: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserIpCountRanking {
    pub username: String,
    pub display_name: String,
    pub ip: String,
    pub ip_count: i64,
    pub count: i64,
    pub tokens: i64,
    pub quota: i64,
}

impl From<&UserAggregateRow> for UserCallRanking {
    fn from(row: &UserAggregateRow) -> Self {
        Self {
            username: row.username.clone(),
            display_name: row.display_name.clone(),
            ip: row.ip.clone(),
            ip_count: row.ip_count,
            count: row.count,
        }
    }
}

impl From<&UserAggregateRow> for UserTokenRanking {
    fn from(row: &UserAggregateRow) -> Self {
        Self {
            username: row.username.clone(),
            display_name: row.display_name.clone(),
            tokens: row.tokens,
            count: row.count,
            quota: row.quota,
        }
    }
}
