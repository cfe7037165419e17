/// 缓存操作

// 限流请求时间列表采样
pub mod rate_limit;

// 当日排行榜
pub mod ranking;
