//! 静态分组倍率与可用分组配置

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;

use crate::error::ValidationError;

pub const OPTION_GROUP_RATIO: &str = "GroupRatio";
pub const OPTION_GROUP_GROUP_RATIO: &str = "GroupGroupRatio";
pub const OPTION_USABLE_GROUPS: &str = "UserUsableGroups";
pub const OPTION_SPECIAL_USABLE_GROUPS: &str = "GroupSpecialUsableGroup";
pub const OPTION_AUTO_GROUPS: &str = "AutoGroups";

/// 可用分组指令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupDirective {
    /// 添加或覆盖分组及描述
    Add { group: String, desc: String },
    /// 移除分组
    Remove { group: String },
}

impl GroupDirective {
    /// 解析 `add:<group>:<desc>`、`remove:<group>` 或 `<group>:<desc>`，
    /// 兼容旧写法 `+:` / `-:`
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if let Some(group) = raw
            .strip_prefix("remove:")
            .or_else(|| raw.strip_prefix("-:"))
        {
            let group = group.split(':').next().unwrap_or("").trim();
            return (!group.is_empty()).then(|| GroupDirective::Remove {
                group: group.to_string(),
            });
        }

        let rest = raw
            .strip_prefix("add:")
            .or_else(|| raw.strip_prefix("+:"))
            .unwrap_or(raw);
        let (group, desc) = rest.split_once(':').unwrap_or((rest, ""));
        let group = group.trim();
        if group.is_empty() {
            return None;
        }
        Some(GroupDirective::Add {
            group: group.to_string(),
            desc: desc.to_string(),
        })
    }

    pub fn apply(&self, groups: &mut BTreeMap<String, String>) {
        match self {
            GroupDirective::Add { group, desc } => {
                groups.insert(group.clone(), desc.clone());
            }
            GroupDirective::Remove { group } => {
                groups.remove(group);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSetting {
    /// 分组基础倍率，键集合即全部分组
    pub group_ratio: BTreeMap<String, f64>,
    /// 用户分组 -> 目标分组 -> 倍率
    pub group_group_ratio: HashMap<String, HashMap<String, f64>>,
    /// 默认可用分组及描述
    pub usable_groups: BTreeMap<String, String>,
    /// 用户分组的特殊可用分组指令，原始字符串
    pub special_usable_groups: HashMap<String, Vec<String>>,
    #[serde(skip)]
    directives: HashMap<String, Vec<GroupDirective>>,
    pub auto_groups: Vec<String>,
}

impl Default for GroupSetting {
    fn default() -> Self {
        Self {
            group_ratio: BTreeMap::from([
                ("default".to_string(), 1.0),
                ("vip".to_string(), 1.0),
                ("svip".to_string(), 1.0),
            ]),
            group_group_ratio: HashMap::new(),
            usable_groups: BTreeMap::from([
                ("default".to_string(), "默认分组".to_string()),
                ("vip".to_string(), "vip分组".to_string()),
            ]),
            special_usable_groups: HashMap::new(),
            directives: HashMap::new(),
            auto_groups: vec!["default".to_string()],
        }
    }
}

impl GroupSetting {
    pub fn directives_for(&self, caller_group: &str) -> Option<&[GroupDirective]> {
        self.directives.get(caller_group).map(Vec::as_slice)
    }

    pub fn pair_ratio(&self, caller_group: &str, group: &str) -> Option<f64> {
        self.group_group_ratio
            .get(caller_group)
            .and_then(|m| m.get(group))
            .copied()
    }

    pub fn option_keys() -> [&'static str; 5] {
        [
            OPTION_GROUP_RATIO,
            OPTION_GROUP_GROUP_RATIO,
            OPTION_USABLE_GROUPS,
            OPTION_SPECIAL_USABLE_GROUPS,
            OPTION_AUTO_GROUPS,
        ]
    }

    /// 返回替换了某个选项后的新配置，自身不变
    pub fn with_option(&self, key: &str, payload: &str) -> Result<Self, ValidationError> {
        let mut next = self.clone();
        match key {
            OPTION_GROUP_RATIO => {
                let ratios: BTreeMap<String, f64> =
                    serde_json::from_str(payload).map_err(ValidationError::malformed)?;
                if let Some((group, _)) = ratios.iter().find(|(_, r)| !(**r >= 0.0)) {
                    return Err(ValidationError::NegativeGroupRatio(group.clone()));
                }
                next.group_ratio = ratios;
            }
            OPTION_GROUP_GROUP_RATIO => {
                let ratios: HashMap<String, HashMap<String, f64>> =
                    serde_json::from_str(payload).map_err(ValidationError::malformed)?;
                for targets in ratios.values() {
                    if let Some((group, _)) = targets.iter().find(|(_, r)| !(**r >= 0.0)) {
                        return Err(ValidationError::NegativeGroupRatio(group.clone()));
                    }
                }
                next.group_group_ratio = ratios;
            }
            OPTION_USABLE_GROUPS => {
                next.usable_groups =
                    serde_json::from_str(payload).map_err(ValidationError::malformed)?;
            }
            OPTION_SPECIAL_USABLE_GROUPS => {
                let raw: HashMap<String, Vec<String>> =
                    serde_json::from_str(payload).map_err(ValidationError::malformed)?;
                let mut directives = HashMap::with_capacity(raw.len());
                for (group, entries) in &raw {
                    let parsed = entries
                        .iter()
                        .map(|entry| {
                            GroupDirective::parse(entry).ok_or_else(|| {
                                ValidationError::MalformedDirective {
                                    group: group.clone(),
                                    directive: entry.clone(),
                                }
                            })
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    directives.insert(group.clone(), parsed);
                }
                next.special_usable_groups = raw;
                next.directives = directives;
            }
            OPTION_AUTO_GROUPS => {
                next.auto_groups =
                    serde_json::from_str(payload).map_err(ValidationError::malformed)?;
            }
            other => return Err(ValidationError::UnknownOption(other.to_string())),
        }
        Ok(next)
    }

    pub fn option_json(&self, key: &str) -> Option<String> {
        let value = match key {
            OPTION_GROUP_RATIO => serde_json::to_string(&self.group_ratio),
            OPTION_GROUP_GROUP_RATIO => serde_json::to_string(&self.group_group_ratio),
            OPTION_USABLE_GROUPS => serde_json::to_string(&self.usable_groups),
            OPTION_SPECIAL_USABLE_GROUPS => serde_json::to_string(&self.special_usable_groups),
            OPTION_AUTO_GROUPS => serde_json::to_string(&self.auto_groups),
            _ => return None,
        };
        value
            .map_err(|e| tracing::error!("Failed to serialize option {}: {}", key, e))
            .ok()
    }
}

#[derive(Debug, Default)]
pub struct GroupSettingStore {
    current: RwLock<Arc<GroupSetting>>,
}

impl GroupSettingStore {
    pub fn new(setting: GroupSetting) -> Self {
        Self {
            current: RwLock::new(Arc::new(setting)),
        }
    }

    pub fn get(&self) -> Arc<GroupSetting> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn validate(&self, key: &str, payload: &str) -> Result<(), ValidationError> {
        self.get().with_option(key, payload).map(|_| ())
    }

    pub fn update_option(&self, key: &str, payload: &str) -> Result<(), ValidationError> {
        // 整个读改写在写锁内完成，避免并发更新不同选项时互相覆盖
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let next = guard.with_option(key, payload)?;
        *guard = Arc::new(next);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_directives() {
        assert_eq!(
            GroupDirective::parse("add:premium:高级分组"),
            Some(GroupDirective::Add {
                group: "premium".into(),
                desc: "高级分组".into()
            })
        );
        assert_eq!(
            GroupDirective::parse("remove:default"),
            Some(GroupDirective::Remove {
                group: "default".into()
            })
        );
        assert_eq!(
            GroupDirective::parse("special:特殊: 分组"),
            Some(GroupDirective::Add {
                group: "special".into(),
                desc: "特殊: 分组".into()
            })
        );
        assert_eq!(
            GroupDirective::parse("-:default"),
            Some(GroupDirective::Remove {
                group: "default".into()
            })
        );
        assert_eq!(
            GroupDirective::parse("lonely"),
            Some(GroupDirective::Add {
                group: "lonely".into(),
                desc: String::new()
            })
        );
        assert_eq!(GroupDirective::parse("remove:"), None);
        assert_eq!(GroupDirective::parse("add::desc"), None);
        assert_eq!(GroupDirective::parse(""), None);
    }

    #[test]
    fn negative_group_ratio_rejected() {
        let setting = GroupSetting::default();
        assert_eq!(
            setting.with_option(OPTION_GROUP_RATIO, r#"{"default":1,"vip":-2}"#),
            Err(ValidationError::NegativeGroupRatio("vip".into()))
        );
    }

    #[test]
    fn malformed_directive_rejected_and_store_untouched() {
        let store = GroupSettingStore::default();
        let err = store
            .update_option(OPTION_SPECIAL_USABLE_GROUPS, r#"{"vip":["add:premium:高级","remove:"]}"#)
            .unwrap_err();
        assert!(matches!(err, ValidationError::MalformedDirective { .. }));
        assert!(store.get().directives_for("vip").is_none());
    }

    #[test]
    fn update_replaces_single_option() {
        let store = GroupSettingStore::default();
        store
            .update_option(OPTION_GROUP_GROUP_RATIO, r#"{"vip":{"default":0.8}}"#)
            .unwrap();
        let setting = store.get();
        assert_eq!(setting.pair_ratio("vip", "default"), Some(0.8));
        assert_eq!(setting.pair_ratio("default", "vip"), None);
        assert_eq!(setting.group_ratio, GroupSetting::default().group_ratio);
    }

    #[test]
    fn unknown_option_rejected() {
        let store = GroupSettingStore::default();
        assert_eq!(
            store.validate("ModelRatio", "{}"),
            Err(ValidationError::UnknownOption("ModelRatio".into()))
        );
    }

    #[test]
    fn option_json_roundtrip() {
        let store = GroupSettingStore::default();
        store
            .update_option(OPTION_AUTO_GROUPS, r#"["vip","default"]"#)
            .unwrap();
        assert_eq!(
            store.get().option_json(OPTION_AUTO_GROUPS).as_deref(),
            Some(r#"["vip","default"]"#)
        );
        assert!(store.get().option_json("Nope").is_none());
    }
}
