use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use redis::{AsyncCommands, Client as RedisClient};

use crate::cache::keys::{RATE_LIMIT_TIME_FORMAT, user_rate_limit_key};
use crate::config::{Config, RpmSubject};

/// 速率采样对象
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateSubject {
    User(i64),
    System,
}

impl RateSubject {
    /// 按进程配置为某个用户选择采样对象
    pub fn for_user(mode: RpmSubject, user_id: i64) -> Self {
        match mode {
            RpmSubject::User => RateSubject::User(user_id),
            RpmSubject::System => RateSubject::System,
        }
    }
}

/// 最近窗口内的请求数，任何失败都按 0 处理
#[async_trait]
pub trait RateSource: Send + Sync {
    async fn current_rate(&self, subject: &RateSubject, window_minutes: i64) -> i64;
}

/// 读取限流系统在 Redis 中维护的请求时间列表
pub struct RateLimitCacheOperations {
    redis: Option<Arc<RedisClient>>,
    tz: Tz,
    system_key: String,
    timeout: Duration,
}

impl RateLimitCacheOperations {
    pub fn new(redis: Option<Arc<RedisClient>>, config: &Config) -> Self {
        Self {
            redis,
            tz: config.tz(),
            system_key: config.rpm_system_key.clone(),
            timeout: config.rate_sample_timeout(),
        }
    }

    fn key_for(&self, subject: &RateSubject) -> String {
        match subject {
            RateSubject::User(user_id) => user_rate_limit_key(*user_id),
            RateSubject::System => self.system_key.clone(),
        }
    }

    async fn list_timestamps(
        redis: &RedisClient,
        key: &str,
    ) -> Result<Vec<String>, redis::RedisError> {
        let mut conn = redis.get_multiplexed_async_connection().await?;
        // 键不存在时 LRANGE 返回空列表
        conn.lrange(key, 0, -1).await
    }
}

#[async_trait]
impl RateSource for RateLimitCacheOperations {
    async fn current_rate(&self, subject: &RateSubject, window_minutes: i64) -> i64 {
        let Some(redis) = self.redis.as_ref() else {
            return 0;
        };

        let key = self.key_for(subject);
        let timestamps =
            match tokio::time::timeout(self.timeout, Self::list_timestamps(redis, &key)).await {
                Ok(Ok(ts)) => ts,
                Ok(Err(e)) => {
                    tracing::warn!("Failed to read rate limit list {}: {}", key, e);
                    return 0;
                }
                Err(_) => {
                    tracing::warn!("Reading rate limit list {} timed out", key);
                    return 0;
                }
            };

        count_in_window(&timestamps, self.tz, Utc::now(), window_minutes)
    }
}

/// 统计落在 [now - window, now] 内的时间戳，无法解析的条目跳过
pub fn count_in_window(
    timestamps: &[String],
    tz: Tz,
    now: DateTime<Utc>,
    window_minutes: i64,
) -> i64 {
    // 窗口超出可表示范围时不设下界
    let cutoff = chrono::Duration::try_minutes(window_minutes)
        .and_then(|window| now.checked_sub_signed(window));
    timestamps
        .iter()
        .filter_map(|ts| {
            let naive = NaiveDateTime::parse_from_str(ts.trim(), RATE_LIMIT_TIME_FORMAT).ok()?;
            tz.from_local_datetime(&naive).earliest()
        })
        .filter(|t| {
            let t = t.with_timezone(&Utc);
            t <= now && cutoff.is_none_or(|cutoff| t >= cutoff)
        })
        .count() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(t: DateTime<Utc>, tz: Tz) -> String {
        t.with_timezone(&tz).format(RATE_LIMIT_TIME_FORMAT).to_string()
    }

    #[test]
    fn counts_only_entries_inside_window() {
        let tz = chrono_tz::Asia::Shanghai;
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let entries = vec![
            fmt(now - chrono::Duration::seconds(10), tz),
            fmt(now - chrono::Duration::seconds(59), tz),
            fmt(now - chrono::Duration::seconds(60), tz),
            fmt(now - chrono::Duration::seconds(61), tz),
            fmt(now - chrono::Duration::minutes(5), tz),
        ];
        assert_eq!(count_in_window(&entries, tz, now, 1), 3);
        assert_eq!(count_in_window(&entries, tz, now, 5), 5);
    }

    #[test]
    fn unparseable_entries_are_skipped() {
        let tz = chrono_tz::UTC;
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let entries = vec![
            "garbage".to_string(),
            "2025-06-01T11:59:30Z".to_string(),
            "2025-06-01 11:59:30".to_string(),
        ];
        assert_eq!(count_in_window(&entries, tz, now, 1), 1);
    }

    #[test]
    fn future_entries_not_counted() {
        let tz = chrono_tz::UTC;
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let entries = vec!["2025-06-01 12:00:30".to_string()];
        assert_eq!(count_in_window(&entries, tz, now, 1), 0);
    }

    #[test]
    fn huge_window_counts_everything_up_to_now() {
        let tz = chrono_tz::UTC;
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let entries = vec![
            "1999-01-01 00:00:00".to_string(),
            "2025-06-01 11:59:30".to_string(),
            "2025-06-01 12:00:30".to_string(),
        ];
        assert_eq!(count_in_window(&entries, tz, now, 10_000_000_000_000), 2);
        assert_eq!(count_in_window(&entries, tz, now, i64::MAX), 2);
    }

    #[test]
    fn subject_maps_to_list_key() {
        let mut config = Config::new("postgres://localhost/test".into(), "secret".into());
        config.rpm_system_key = "rateLimit:MRRLS:global".into();
        let sampler = RateLimitCacheOperations::new(None, &config);
        assert_eq!(sampler.key_for(&RateSubject::System), "rateLimit:MRRLS:global");
        assert_eq!(sampler.key_for(&RateSubject::User(42)), "rateLimit:MRRLS:42");
    }

    #[test]
    fn subject_follows_configured_mode() {
        assert_eq!(RateSubject::for_user(RpmSubject::User, 7), RateSubject::User(7));
        assert_eq!(RateSubject::for_user(RpmSubject::System, 7), RateSubject::System);
    }

    #[tokio::test]
    async fn disabled_redis_reports_zero() {
        let config = Config::new("postgres://localhost/test".into(), "secret".into());
        let sampler = RateLimitCacheOperations::new(None, &config);
        assert_eq!(sampler.current_rate(&RateSubject::User(1), 1).await, 0);
    }

    #[tokio::test]
    async fn unreachable_redis_reports_zero() {
        let mut config = Config::new("postgres://localhost/test".into(), "secret".into());
        config.rate_sample_timeout_ms = 200;
        // 本地保留端口，连接必然失败
        let client = RedisClient::open("redis://127.0.0.1:1/").unwrap();
        let sampler = RateLimitCacheOperations::new(Some(Arc::new(client)), &config);
        assert_eq!(sampler.current_rate(&RateSubject::System, 1).await, 0);
    }
}
