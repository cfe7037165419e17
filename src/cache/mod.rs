// 缓存模块
// Redis 键定义与读取操作，以及进程内的排行榜缓存

pub mod keys;
pub mod operations;

pub use operations::rate_limit::{RateLimitCacheOperations, RateSource, RateSubject};
pub use operations::ranking::{RankingCache, RankingSnapshot, RankingSource};
