/// 限流系统的滑动窗口列表键前缀，列表元素是请求时间
const MODEL_REQUEST_RATE_LIMIT_PREFIX: &str = "rateLimit:MRRLS:";

/// 列表中时间戳的格式，按进程时区写入
pub const RATE_LIMIT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 生成用户请求时间列表键
pub fn user_rate_limit_key(user_id: i64) -> String {
    format!("{}{}", MODEL_REQUEST_RATE_LIMIT_PREFIX, user_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_key_matches_rate_limiter() {
        assert_eq!(user_rate_limit_key(42), "rateLimit:MRRLS:42");
    }
}
