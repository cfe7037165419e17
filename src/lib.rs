use std::sync::Arc;

use config::Config;
use redis::Client as RedisClient;
use sqlx::PgPool;

pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod middleware;
pub mod result;
pub mod router;
pub mod routes;
pub mod service;
pub mod setting;
pub mod utils;

use cache::RankingCache;
use database::LogRepository;
use service::PricingService;
use setting::SettingRegistry;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub settings: Arc<SettingRegistry>,
    pub pricing: PricingService,
    pub ranking: Arc<RankingCache>,
    pub logs: Arc<LogRepository>,
}

impl AppState {
    /// 按配置组装各服务，配置项为内置默认值，需调用 settings.reload() 从库里加载。
    /// 未配置 REDIS_URL 时 redis 为 None
    pub fn new(pool: PgPool, config: Config, redis: Option<Arc<RedisClient>>) -> Self {
        let db = Arc::new(pool);

        let dynamic = Arc::new(setting::DynamicRatioStore::default());
        let groups = Arc::new(setting::GroupSettingStore::default());
        let settings = Arc::new(SettingRegistry::new(
            dynamic.clone(),
            groups.clone(),
            Arc::new(database::OptionRepository::new(db.clone())),
        ));

        let rate_source = Arc::new(cache::RateLimitCacheOperations::new(redis, &config));
        let engine = service::RatioEngine::new(dynamic, groups.clone(), rate_source, config.rpm_subject);
        let pricing = PricingService::new(groups, engine);

        let logs = Arc::new(LogRepository::new(db));
        let ranking = Arc::new(RankingCache::new(logs.clone(), &config));

        Self {
            config,
            settings,
            pricing,
            ranking,
            logs,
        }
    }
}
