use std::env;
use std::time::Duration;

use chrono_tz::Tz;

/// RPM 动态倍率的采样对象
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RpmSubject {
    /// 按调用用户自己的请求速率
    User,
    /// 按全系统的请求速率
    System,
}

impl RpmSubject {
    fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "system" => RpmSubject::System,
            "user" => RpmSubject::User,
            other => {
                tracing::warn!("Unknown RPM_SUBJECT {:?}, falling back to user", other);
                RpmSubject::User
            }
        }
    }
}

pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Asia::Shanghai;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub database_url: String,
    pub redis_url: Option<String>,
    pub jwt_secret: String,
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    pub timezone: String,
    pub ranking_limit: usize,
    pub ranking_cache_ttl_secs: u64,
    pub rpm_subject: RpmSubject,
    pub rpm_system_key: String,
    pub rate_sample_timeout_ms: u64,
    pub option_sync_interval_secs: u64,
}

impl Config {
    /// 除必填项外全部取默认值
    pub fn new(database_url: String, jwt_secret: String) -> Self {
        Self {
            database_url,
            redis_url: None,
            jwt_secret,
            server_host: "0.0.0.0".into(),
            server_port: 3000,
            api_base_uri: "/api".into(),
            timezone: DEFAULT_TIMEZONE.name().into(),
            ranking_limit: 100,
            ranking_cache_ttl_secs: 300,
            rpm_subject: RpmSubject::User,
            rpm_system_key: "rateLimit:MRRLS:system".into(),
            rate_sample_timeout_ms: 500,
            option_sync_interval_secs: 60,
        }
    }

    pub fn from_env() -> Result<Self, env::VarError> {
        dotenv::dotenv().ok();

        let defaults = Config::new(env::var("DATABASE_URL")?, env::var("JWT_SECRET")?);
        Ok(Config {
            redis_url: env::var("REDIS_URL").ok().filter(|s| !s.trim().is_empty()),
            server_host: env::var("SERVER_HOST")?,
            server_port: parse_or("SERVER_PORT", defaults.server_port),
            api_base_uri: env::var("API_BASE_URI").unwrap_or(defaults.api_base_uri.clone()),
            timezone: env::var("TIMEZONE").unwrap_or(defaults.timezone.clone()),
            ranking_limit: parse_or("RANKING_LIMIT", defaults.ranking_limit),
            ranking_cache_ttl_secs: parse_or("RANKING_CACHE_TTL", defaults.ranking_cache_ttl_secs),
            rpm_subject: env::var("RPM_SUBJECT")
                .map(|s| RpmSubject::parse(&s))
                .unwrap_or(defaults.rpm_subject),
            rpm_system_key: env::var("RPM_SYSTEM_KEY").unwrap_or(defaults.rpm_system_key.clone()),
            rate_sample_timeout_ms: parse_or(
                "RATE_SAMPLE_TIMEOUT_MS",
                defaults.rate_sample_timeout_ms,
            ),
            option_sync_interval_secs: parse_or(
                "OPTION_SYNC_INTERVAL",
                defaults.option_sync_interval_secs,
            ),
            ..defaults
        })
    }

    /// 进程时区，非法时回退到 Asia/Shanghai
    pub fn tz(&self) -> Tz {
        parse_timezone(&self.timezone)
    }

    pub fn ranking_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.ranking_cache_ttl_secs)
    }

    pub fn rate_sample_timeout(&self) -> Duration {
        Duration::from_millis(self.rate_sample_timeout_ms)
    }

    pub fn option_sync_interval(&self) -> Duration {
        Duration::from_secs(self.option_sync_interval_secs)
    }
}

pub fn parse_timezone(name: &str) -> Tz {
    name.parse::<Tz>().unwrap_or_else(|_| {
        tracing::debug!("Invalid timezone {:?}, using {}", name, DEFAULT_TIMEZONE);
        DEFAULT_TIMEZONE
    })
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
