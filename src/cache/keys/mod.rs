/// 缓存键模块
/// 提供各种缓存键生成函数

// 限流滑动窗口键
pub mod rate_limit_keys;

pub use rate_limit_keys::{RATE_LIMIT_TIME_FORMAT, user_rate_limit_key};
