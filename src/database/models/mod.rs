// 数据库实体定义

pub mod log;
pub mod ranking;

pub use log::{LOG_TYPE_CONSUME, LogEntity, UsageStat};
pub use ranking::{
    IpCallRanking, UserAggregateRow, UserCallRanking, UserIpCountRanking, UserMinuteIpRanking,
    UserTokenRanking,
};
