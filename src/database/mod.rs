// 数据库模块
// 包含数据库实体定义和存储库操作

pub mod models; // 数据库实体定义
pub mod repositories; // 存储库

pub use repositories::log::LogRepository;
pub use repositories::option::OptionRepository;
