// 运行时可调整的配置项
// 内存中整体替换，由注册表负责持久化与同步

pub mod dynamic_ratio;
pub mod group_ratio;
pub mod registry;

pub use dynamic_ratio::{DynamicRatioConfig, DynamicRatioStore};
pub use group_ratio::{GroupSetting, GroupSettingStore};
pub use registry::{OPTION_DYNAMIC_GROUP_RATIO, OptionStore, SettingRegistry};
