use std::collections::BTreeMap;
use std::sync::Arc;

use crate::setting::group_ratio::GroupSettingStore;

/// 用户自身分组不在可用分组中时的默认描述
pub const USER_GROUP_DESCRIPTION: &str = "用户分组";

/// 计算用户分组可用的分组集合
#[derive(Clone)]
pub struct GroupResolver {
    settings: Arc<GroupSettingStore>,
}

impl GroupResolver {
    pub fn new(settings: Arc<GroupSettingStore>) -> Self {
        Self { settings }
    }

    /// 返回分组 -> 描述，结果是副本，不受后续配置重载影响
    pub fn resolve(&self, caller_group: &str) -> BTreeMap<String, String> {
        let setting = self.settings.get();
        let mut groups = setting.usable_groups.clone();
        if caller_group.is_empty() {
            return groups;
        }

        if let Some(directives) = setting.directives_for(caller_group) {
            for directive in directives {
                directive.apply(&mut groups);
            }
        }

        groups
            .entry(caller_group.to_string())
            .or_insert_with(|| USER_GROUP_DESCRIPTION.to_string());
        groups
    }

    pub fn contains(&self, caller_group: &str, group: &str) -> bool {
        self.resolve(caller_group).contains_key(group)
    }

    /// 自动分组列表中用户可用的部分，保持配置顺序
    pub fn auto_groups(&self, caller_group: &str) -> Vec<String> {
        let usable = self.resolve(caller_group);
        self.settings
            .get()
            .auto_groups
            .iter()
            .filter(|g| usable.contains_key(g.as_str()))
            .cloned()
            .collect()
    }
}
