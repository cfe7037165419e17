//! 当日排行榜缓存
//!
//! 五分钟内且同一天内复用同一份快照。刷新时并发发出三个聚合查询，任一失败则整体失败，
//! 不写入部分结果。非管理员拿到的是 IP 脱敏后的副本，缓存中始终保存原始数据。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use futures_util::future::try_join3;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use crate::config::Config;
use crate::database::models::{
    IpCallRanking, UserAggregateRow, UserCallRanking, UserIpCountRanking, UserMinuteIpRanking,
    UserTokenRanking,
};

/// 排行榜数据来源
#[async_trait]
pub trait RankingSource: Send + Sync {
    async fn today_user_aggregates(&self, day_start: i64)
    -> Result<Vec<UserAggregateRow>, sqlx::Error>;

    async fn today_ip_calls(&self, day_start: i64, limit: i64)
    -> Result<Vec<IpCallRanking>, sqlx::Error>;

    async fn today_user_minute_ips(
        &self,
        day_start: i64,
        limit: i64,
        timezone: &str,
    ) -> Result<Vec<UserMinuteIpRanking>, sqlx::Error>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankingSnapshot {
    pub user_call_ranking: Vec<UserCallRanking>,
    pub ip_call_ranking: Vec<IpCallRanking>,
    pub user_token_ranking: Vec<UserTokenRanking>,
    pub user_ip_count_ranking: Vec<UserIpCountRanking>,
    pub user_minute_ip_ranking: Vec<UserMinuteIpRanking>,
    pub computed_at: DateTime<Utc>,
    #[serde(skip)]
    pub day: NaiveDate,
}

impl RankingSnapshot {
    pub fn build(
        aggregates: &[UserAggregateRow],
        ip_call_ranking: Vec<IpCallRanking>,
        user_minute_ip_ranking: Vec<UserMinuteIpRanking>,
        limit: usize,
        computed_at: DateTime<Utc>,
        day: NaiveDate,
    ) -> Self {
        Self {
            user_call_ranking: build_user_call_ranking(aggregates, limit),
            ip_call_ranking,
            user_token_ranking: build_user_token_ranking(aggregates, limit),
            user_ip_count_ranking: build_user_ip_count_ranking(aggregates, limit),
            user_minute_ip_ranking,
            computed_at,
            day,
        }
    }

    fn is_fresh(&self, now: DateTime<Utc>, today: NaiveDate, ttl: chrono::Duration) -> bool {
        now - self.computed_at < ttl && self.day == today
    }

    /// 脱敏副本
    pub fn masked(&self) -> Self {
        let mut copy = self.clone();
        for row in &mut copy.user_call_ranking {
            row.ip = mask_ips(&row.ip);
        }
        for row in &mut copy.ip_call_ranking {
            row.ip = mask_ip(&row.ip);
        }
        for row in &mut copy.user_ip_count_ranking {
            row.ip = mask_ips(&row.ip);
        }
        for row in &mut copy.user_minute_ip_ranking {
            row.ip = mask_ips(&row.ip);
        }
        copy
    }
}

/// 按调用次数降序，次数相同保持查询顺序
pub fn build_user_call_ranking(rows: &[UserAggregateRow], limit: usize) -> Vec<UserCallRanking> {
    let mut sorted: Vec<&UserAggregateRow> = rows.iter().collect();
    sorted.sort_by(|a, b| b.count.cmp(&a.count));
    sorted.into_iter().take(limit).map(UserCallRanking::from).collect()
}

pub fn build_user_token_ranking(rows: &[UserAggregateRow], limit: usize) -> Vec<UserTokenRanking> {
    let mut sorted: Vec<&UserAggregateRow> = rows.iter().collect();
    sorted.sort_by(|a, b| b.tokens.cmp(&a.tokens));
    sorted.into_iter().take(limit).map(UserTokenRanking::from).collect()
}

/// 过滤空 IP 后重新计数，没有有效 IP 的用户不参与排名
pub fn build_user_ip_count_ranking(
    rows: &[UserAggregateRow],
    limit: usize,
) -> Vec<UserIpCountRanking> {
    let mut ranking: Vec<UserIpCountRanking> = rows
        .iter()
        .filter_map(|r| {
            let mut valid: Vec<&str> = Vec::new();
            for ip in r.ip.split(',').map(str::trim).filter(|ip| !ip.is_empty()) {
                if !valid.contains(&ip) {
                    valid.push(ip);
                }
            }
            if valid.is_empty() {
                return None;
            }
            Some(UserIpCountRanking {
                username: r.username.clone(),
                display_name: r.display_name.clone(),
                ip: valid.join(","),
                ip_count: valid.len() as i64,
                count: r.count,
                tokens: r.tokens,
                quota: r.quota,
            })
        })
        .collect();
    ranking.sort_by(|a, b| b.ip_count.cmp(&a.ip_count));
    ranking.truncate(limit);
    ranking
}

/// IPv4 显示首尾两段，其他格式保留首尾各 4 个字符
pub fn mask_ip(ip: &str) -> String {
    let parts: Vec<&str> = ip.split('.').collect();
    if parts.len() == 4 {
        return format!("{}.***.***.{}", parts[0], parts[3]);
    }
    let chars: Vec<char> = ip.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        return format!("{}****{}", head, tail);
    }
    "****".to_string()
}

pub fn mask_ips(ips: &str) -> String {
    ips.split(',')
        .map(|ip| mask_ip(ip.trim()))
        .collect::<Vec<_>>()
        .join(",")
}

/// 排行榜缓存
pub struct RankingCache {
    source: Arc<dyn RankingSource>,
    tz: Tz,
    limit: usize,
    ttl: chrono::Duration,
    current: RwLock<Option<Arc<RankingSnapshot>>>,
    // 同一时刻只允许一个刷新
    refresh: Mutex<()>,
}

impl RankingCache {
    pub fn new(source: Arc<dyn RankingSource>, config: &Config) -> Self {
        Self::with_settings(
            source,
            config.tz(),
            config.ranking_limit,
            chrono::Duration::from_std(config.ranking_cache_ttl())
                .unwrap_or_else(|_| chrono::Duration::seconds(300)),
        )
    }

    pub fn with_settings(
        source: Arc<dyn RankingSource>,
        tz: Tz,
        limit: usize,
        ttl: chrono::Duration,
    ) -> Self {
        Self {
            source,
            tz,
            limit,
            ttl,
            current: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    pub async fn snapshot(&self, privileged: bool) -> Result<RankingSnapshot, sqlx::Error> {
        self.snapshot_at(privileged, Utc::now()).await
    }

    pub async fn snapshot_at(
        &self,
        privileged: bool,
        now: DateTime<Utc>,
    ) -> Result<RankingSnapshot, sqlx::Error> {
        let snapshot = self.load_at(now).await?;
        Ok(if privileged {
            snapshot.as_ref().clone()
        } else {
            snapshot.masked()
        })
    }

    async fn fresh_at(&self, now: DateTime<Utc>, today: NaiveDate) -> Option<Arc<RankingSnapshot>> {
        let current = self.current.read().await;
        current
            .as_ref()
            .filter(|s| s.is_fresh(now, today, self.ttl))
            .cloned()
    }

    async fn load_at(&self, now: DateTime<Utc>) -> Result<Arc<RankingSnapshot>, sqlx::Error> {
        let today = self.today(now);
        if let Some(snapshot) = self.fresh_at(now, today).await {
            return Ok(snapshot);
        }

        let _guard = self.refresh.lock().await;
        // 等锁期间可能已被其他请求刷新
        if let Some(snapshot) = self.fresh_at(now, today).await {
            tracing::debug!("Ranking cache refreshed by concurrent request");
            return Ok(snapshot);
        }

        let day_start = self.day_start(today);
        let limit = i64::try_from(self.limit).unwrap_or(i64::MAX);
        let (aggregates, ip_calls, minute_ips) = try_join3(
            self.source.today_user_aggregates(day_start),
            self.source.today_ip_calls(day_start, limit),
            self.source
                .today_user_minute_ips(day_start, limit, self.tz.name()),
        )
        .await
        .inspect_err(|e| tracing::error!("Failed to refresh ranking cache: {}", e))?;

        let snapshot = Arc::new(RankingSnapshot::build(
            &aggregates,
            ip_calls,
            minute_ips,
            self.limit,
            now,
            today,
        ));
        *self.current.write().await = Some(snapshot.clone());
        tracing::info!(
            "Ranking cache refreshed: {} users, day {}",
            aggregates.len(),
            today
        );
        Ok(snapshot)
    }

    fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.tz).date_naive()
    }

    /// 配置时区当天零点的 Unix 时间戳
    fn day_start(&self, day: NaiveDate) -> i64 {
        let midnight = day.and_time(NaiveTime::MIN);
        self.tz
            .from_local_datetime(&midnight)
            .earliest()
            .map(|t| t.timestamp())
            .unwrap_or_else(|| midnight.and_utc().timestamp())
    }
}
