use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::cache::operations::rate_limit::RateSubject;
use crate::service::group::GroupResolver;
use crate::service::ratio::RatioEngine;
use crate::setting::group_ratio::GroupSettingStore;

pub const AUTO_GROUP: &str = "auto";
pub const AUTO_GROUP_DESCRIPTION: &str = "自动选择最优分组";
/// auto 分组的倍率展示值
pub const AUTO_GROUP_RATIO: &str = "自动";
pub const DEFAULT_GROUP: &str = "default";

/// 倍率取值，auto 分组没有固定倍率
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RatioValue {
    Fixed(f64),
    Auto(&'static str),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsableGroup {
    pub ratio: RatioValue,
    pub desc: String,
    pub is_dynamic: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemStats {
    pub rpm: i64,
    pub default_ratio: f64,
    pub is_dynamic: bool,
}

/// 对外的分组与倍率查询
#[derive(Clone)]
pub struct PricingService {
    groups: Arc<GroupSettingStore>,
    resolver: GroupResolver,
    engine: RatioEngine,
}

impl PricingService {
    pub fn new(groups: Arc<GroupSettingStore>, engine: RatioEngine) -> Self {
        Self {
            resolver: GroupResolver::new(groups.clone()),
            groups,
            engine,
        }
    }

    pub fn resolver(&self) -> &GroupResolver {
        &self.resolver
    }

    /// 全部配置了倍率的分组名，按名称排序
    pub fn list_all_group_names(&self) -> Vec<String> {
        self.groups.get().group_ratio.keys().cloned().collect()
    }

    pub async fn resolve_usable_groups(
        &self,
        caller_group: &str,
        user_id: i64,
    ) -> BTreeMap<String, UsableGroup> {
        let usable = self.resolver.resolve(caller_group);
        let mut result = BTreeMap::new();

        for (group, desc) in &usable {
            if group == AUTO_GROUP {
                continue;
            }
            let effective = self.engine.effective_ratio(caller_group, group, user_id).await;
            result.insert(
                group.clone(),
                UsableGroup {
                    ratio: RatioValue::Fixed(effective.ratio),
                    desc: desc.clone(),
                    is_dynamic: effective.is_dynamic,
                },
            );
        }

        if usable.contains_key(AUTO_GROUP) {
            result.insert(
                AUTO_GROUP.to_string(),
                UsableGroup {
                    ratio: RatioValue::Auto(AUTO_GROUP_RATIO),
                    desc: AUTO_GROUP_DESCRIPTION.to_string(),
                    is_dynamic: false,
                },
            );
        }
        result
    }

    /// 首页统计：全系统 RPM 与 default 分组当前倍率
    pub async fn system_stats(&self) -> SystemStats {
        let rpm = self.engine.current_rate(&RateSubject::System).await;
        let effective = self
            .engine
            .resolve(DEFAULT_GROUP, DEFAULT_GROUP, &RateSubject::System, Utc::now())
            .await;
        SystemStats {
            rpm,
            default_ratio: effective.ratio,
            is_dynamic: effective.is_dynamic,
        }
    }
}
