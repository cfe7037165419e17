// 日志存储库
// 只读查询与历史日志清理，日志写入不在本服务

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{Error as SqlxError, PgPool, Postgres, QueryBuilder};

use crate::cache::operations::ranking::RankingSource;
use crate::database::models::{
    IpCallRanking, LOG_TYPE_CONSUME, LogEntity, UsageStat, UserAggregateRow, UserMinuteIpRanking,
};

const LOG_COLUMNS: &str = r#"id, user_id, created_at, type, content, username, token_name,
    model_name, quota, prompt_tokens, completion_tokens, use_time, is_stream, channel_id,
    "group", ip"#;

/// 搜索结果条数上限
const SEARCH_LIMIT: i64 = 100;

const LIKE_ESCAPE: &str = r" ESCAPE '\'";

/// 关键字按字面匹配，转义 LIKE 通配符
fn contains_pattern(keyword: &str) -> String {
    let mut pattern = String::with_capacity(keyword.len() + 2);
    pattern.push('%');
    for c in keyword.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// 日志过滤条件，零值表示不过滤
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogFilter {
    #[serde(rename = "type")]
    pub log_type: i32,
    pub start_timestamp: i64,
    pub end_timestamp: i64,
    pub model_name: String,
    pub username: String,
    pub token_name: String,
    pub channel: i64,
    pub group: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct PageQuery {
    pub p: i64,
    pub page_size: i64,
}

impl Default for PageQuery {
    fn default() -> Self {
        Self { p: 1, page_size: 10 }
    }
}

impl PageQuery {
    pub fn page(&self) -> i64 {
        self.p.max(1)
    }

    pub fn page_size(&self) -> i64 {
        self.page_size.clamp(1, 100)
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1) * self.page_size()
    }
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub page: i64,
    pub page_size: i64,
    pub total: i64,
    pub items: Vec<T>,
}

/// 日志存储库
pub struct LogRepository {
    db: Arc<PgPool>,
}

impl LogRepository {
    pub fn new(db: Arc<PgPool>) -> Self {
        Self { db }
    }

    fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &LogFilter, user_id: Option<i64>) {
        qb.push(" WHERE 1 = 1");
        if let Some(user_id) = user_id {
            qb.push(" AND user_id = ").push_bind(user_id);
        }
        if filter.log_type != 0 {
            qb.push(" AND type = ").push_bind(filter.log_type);
        }
        if filter.start_timestamp != 0 {
            qb.push(" AND created_at >= ").push_bind(filter.start_timestamp);
        }
        if filter.end_timestamp != 0 {
            qb.push(" AND created_at <= ").push_bind(filter.end_timestamp);
        }
        if !filter.model_name.is_empty() {
            qb.push(" AND model_name LIKE ").push_bind(filter.model_name.clone());
        }
        if !filter.username.is_empty() {
            qb.push(" AND username = ").push_bind(filter.username.clone());
        }
        if !filter.token_name.is_empty() {
            qb.push(" AND token_name = ").push_bind(filter.token_name.clone());
        }
        if filter.channel != 0 {
            qb.push(" AND channel_id = ").push_bind(filter.channel);
        }
        if !filter.group.is_empty() {
            qb.push(r#" AND "group" = "#).push_bind(filter.group.clone());
        }
    }

    /// 分页查询日志，user_id 为 None 时查询全部用户
    pub async fn list_logs(
        &self,
        filter: &LogFilter,
        user_id: Option<i64>,
        page: PageQuery,
    ) -> Result<Page<LogEntity>, SqlxError> {
        let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM logs");
        Self::push_filters(&mut count_qb, filter, user_id);
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(&*self.db)
            .await?;

        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM logs", LOG_COLUMNS));
        Self::push_filters(&mut qb, filter, user_id);
        qb.push(" ORDER BY id DESC LIMIT ")
            .push_bind(page.page_size())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let items = qb
            .build_query_as::<LogEntity>()
            .fetch_all(&*self.db)
            .await?;

        Ok(Page {
            page: page.page(),
            page_size: page.page_size(),
            total,
            items,
        })
    }

    /// 关键字模糊搜索
    pub async fn search_logs(
        &self,
        keyword: &str,
        user_id: Option<i64>,
    ) -> Result<Vec<LogEntity>, SqlxError> {
        let pattern = contains_pattern(keyword);
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM logs WHERE (", LOG_COLUMNS));
        qb.push("content ILIKE ")
            .push_bind(pattern.clone())
            .push(LIKE_ESCAPE)
            .push(" OR model_name ILIKE ")
            .push_bind(pattern.clone())
            .push(LIKE_ESCAPE)
            .push(" OR token_name ILIKE ")
            .push_bind(pattern.clone())
            .push(LIKE_ESCAPE)
            .push(" OR username ILIKE ")
            .push_bind(pattern)
            .push(LIKE_ESCAPE)
            .push(")");
        if let Some(user_id) = user_id {
            qb.push(" AND user_id = ").push_bind(user_id);
        }
        qb.push(" ORDER BY id DESC LIMIT ").push_bind(SEARCH_LIMIT);

        let logs = qb
            .build_query_as::<LogEntity>()
            .fetch_all(&*self.db)
            .await?;
        Ok(logs)
    }

    /// 消费日志用量汇总，rpm/tpm 取最近 60 秒
    pub async fn sum_usage(
        &self,
        filter: &LogFilter,
        user_id: Option<i64>,
        now: i64,
    ) -> Result<UsageStat, SqlxError> {
        let since = now - 60;
        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT COALESCE(SUM(quota), 0)::BIGINT AS quota, COUNT(*) FILTER (WHERE created_at >= ",
        );
        qb.push_bind(since)
            .push(")::BIGINT AS rpm, COALESCE(SUM(prompt_tokens + completion_tokens) FILTER (WHERE created_at >= ")
            .push_bind(since)
            .push("), 0)::BIGINT AS tpm FROM logs");

        // 汇总只针对消费日志
        let filter = LogFilter {
            log_type: LOG_TYPE_CONSUME,
            ..filter.clone()
        };
        Self::push_filters(&mut qb, &filter, user_id);

        let stat = qb
            .build_query_as::<UsageStat>()
            .fetch_one(&*self.db)
            .await?;
        Ok(stat)
    }

    /// 分批删除早于 target_timestamp 的日志，返回删除总数
    pub async fn delete_old_logs(
        &self,
        target_timestamp: i64,
        batch_size: i64,
    ) -> Result<u64, SqlxError> {
        let batch_size = batch_size.max(1);
        let mut total = 0u64;
        loop {
            let deleted = sqlx::query(
                r#"
                DELETE FROM logs
                WHERE id IN (
                    SELECT id FROM logs WHERE created_at < $1 LIMIT $2
                )
                "#,
            )
            .bind(target_timestamp)
            .bind(batch_size)
            .execute(&*self.db)
            .await?
            .rows_affected();

            total += deleted;
            if deleted < batch_size as u64 {
                break;
            }
        }
        tracing::info!("Deleted {} logs older than {}", total, target_timestamp);
        Ok(total)
    }
}

#[async_trait]
impl RankingSource for LogRepository {
    async fn today_user_aggregates(&self, day_start: i64) -> Result<Vec<UserAggregateRow>, SqlxError> {
        sqlx::query_as::<_, UserAggregateRow>(
            r#"
            SELECT
                l.username,
                COALESCE(MAX(u.display_name), '') AS display_name,
                COALESCE(STRING_AGG(DISTINCT NULLIF(l.ip, ''), ','), '') AS ip,
                COUNT(DISTINCT NULLIF(l.ip, ''))::BIGINT AS ip_count,
                COUNT(*)::BIGINT AS count,
                COALESCE(SUM(l.prompt_tokens + l.completion_tokens), 0)::BIGINT AS tokens,
                COALESCE(SUM(l.quota), 0)::BIGINT AS quota
            FROM logs l
            LEFT JOIN users u ON u.id = l.user_id
            WHERE l.type = $1 AND l.created_at >= $2
            GROUP BY l.username
            ORDER BY l.username
            "#,
        )
        .bind(LOG_TYPE_CONSUME)
        .bind(day_start)
        .fetch_all(&*self.db)
        .await
    }

    async fn today_ip_calls(&self, day_start: i64, limit: i64) -> Result<Vec<IpCallRanking>, SqlxError> {
        sqlx::query_as::<_, IpCallRanking>(
            r#"
            SELECT
                l.ip,
                STRING_AGG(DISTINCT l.username, ',') AS username,
                COALESCE(STRING_AGG(DISTINCT NULLIF(u.display_name, ''), ','), '') AS display_name,
                COUNT(*)::BIGINT AS count
            FROM logs l
            LEFT JOIN users u ON u.id = l.user_id
            WHERE l.type = $1 AND l.created_at >= $2 AND l.ip <> ''
            GROUP BY l.ip
            ORDER BY count DESC, l.ip
            LIMIT $3
            "#,
        )
        .bind(LOG_TYPE_CONSUME)
        .bind(day_start)
        .bind(limit)
        .fetch_all(&*self.db)
        .await
    }

    async fn today_user_minute_ips(
        &self,
        day_start: i64,
        limit: i64,
        timezone: &str,
    ) -> Result<Vec<UserMinuteIpRanking>, SqlxError> {
        sqlx::query_as::<_, UserMinuteIpRanking>(
            r#"
            SELECT
                l.username,
                COALESCE(MAX(u.display_name), '') AS display_name,
                TO_CHAR(TO_TIMESTAMP(l.created_at) AT TIME ZONE $4, 'YYYY-MM-DD HH24:MI') AS minute,
                STRING_AGG(DISTINCT l.ip, ',') AS ip,
                COUNT(DISTINCT l.ip)::BIGINT AS ip_count,
                COUNT(*)::BIGINT AS count
            FROM logs l
            LEFT JOIN users u ON u.id = l.user_id
            WHERE l.type = $1 AND l.created_at >= $2 AND l.ip <> ''
            GROUP BY l.username, 3
            ORDER BY ip_count DESC, count DESC, l.username
            LIMIT $3
            "#,
        )
        .bind(LOG_TYPE_CONSUME)
        .bind(day_start)
        .bind(limit)
        .bind(timezone)
        .fetch_all(&*self.db)
        .await
    }
}
