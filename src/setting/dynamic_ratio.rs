//! 动态分组倍率配置
//!
//! 按时间段或按 RPM 区间给分组设置倍率。配置整体替换，读方拿到的是不可变快照。

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_TIMEZONE, parse_timezone};
use crate::error::ValidationError;

/// RPM 采样窗口上限，一天
pub const MAX_RPM_WINDOW_MINUTES: i64 = 24 * 60;

/// 动态倍率模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum DynamicRatioMode {
    None,
    Time,
    Rpm,
}

impl TryFrom<String> for DynamicRatioMode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "none" => Ok(Self::None),
            "time" => Ok(Self::Time),
            "rpm" => Ok(Self::Rpm),
            _ => Err("invalid mode, must be none/time/rpm".to_string()),
        }
    }
}

/// 时间段倍率，start_hour > end_hour 时跨午夜
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeRangeRatio {
    pub start_hour: i32,
    pub end_hour: i32,
    pub ratio: f64,
}

impl TimeRangeRatio {
    pub fn contains(&self, hour: i32) -> bool {
        is_hour_in_range(hour, self.start_hour, self.end_hour)
    }
}

/// RPM 区间倍率，min 包含，max 不包含，-1 表示无上限
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpmRangeRatio {
    pub min_rpm: i64,
    pub max_rpm: i64,
    pub ratio: f64,
}

impl RpmRangeRatio {
    pub fn contains(&self, rpm: i64) -> bool {
        rpm >= self.min_rpm && (self.max_rpm == -1 || rpm < self.max_rpm)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupRuleSet {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub time_ranges: Vec<TimeRangeRatio>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rpm_ranges: Vec<RpmRangeRatio>,
}

impl GroupRuleSet {
    /// 按存储顺序取第一个命中的时间段
    pub fn time_ratio(&self, hour: i32) -> Option<f64> {
        self.time_ranges
            .iter()
            .find(|r| r.contains(hour))
            .map(|r| r.ratio)
    }

    pub fn rpm_ratio(&self, rpm: i64) -> Option<f64> {
        self.rpm_ranges
            .iter()
            .find(|r| r.contains(rpm))
            .map(|r| r.ratio)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicRatioConfig {
    #[serde(default)]
    pub enabled: bool,
    pub mode: DynamicRatioMode,
    #[serde(default)]
    pub rpm_window_minutes: i64,
    #[serde(default)]
    pub timezone: String,
    #[serde(default)]
    pub group_configs: BTreeMap<String, GroupRuleSet>,
}

impl Default for DynamicRatioConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: DynamicRatioMode::None,
            rpm_window_minutes: 1,
            timezone: DEFAULT_TIMEZONE.name().to_string(),
            group_configs: BTreeMap::new(),
        }
    }
}

impl DynamicRatioConfig {
    /// 解析并校验，不修改任何状态
    pub fn parse(payload: &str) -> Result<Self, ValidationError> {
        let config: DynamicRatioConfig =
            serde_json::from_str(payload).map_err(ValidationError::malformed)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.rpm_window_minutes < 1 {
            return Err(ValidationError::WindowTooSmall);
        }
        if self.rpm_window_minutes > MAX_RPM_WINDOW_MINUTES {
            return Err(ValidationError::WindowTooLarge {
                max: MAX_RPM_WINDOW_MINUTES,
            });
        }

        for (group, rules) in &self.group_configs {
            match self.mode {
                DynamicRatioMode::Time => {
                    for (index, tr) in rules.time_ranges.iter().enumerate() {
                        if !(0..=23).contains(&tr.start_hour) || !(0..=24).contains(&tr.end_hour) {
                            return Err(ValidationError::HourOutOfRange {
                                group: group.clone(),
                                index,
                            });
                        }
                        if !(tr.ratio >= 0.0) {
                            return Err(ValidationError::NegativeRangeRatio {
                                group: group.clone(),
                                field: "time_ranges",
                                index,
                            });
                        }
                    }
                }
                DynamicRatioMode::Rpm => {
                    for (index, rr) in rules.rpm_ranges.iter().enumerate() {
                        if rr.min_rpm < 0 {
                            return Err(ValidationError::NegativeMinRpm {
                                group: group.clone(),
                                index,
                            });
                        }
                        if rr.max_rpm != -1 && rr.max_rpm <= rr.min_rpm {
                            return Err(ValidationError::MaxRpmNotAbove {
                                group: group.clone(),
                                index,
                            });
                        }
                        if !(rr.ratio >= 0.0) {
                            return Err(ValidationError::NegativeRangeRatio {
                                group: group.clone(),
                                field: "rpm_ranges",
                                index,
                            });
                        }
                    }
                }
                DynamicRatioMode::None => {}
            }
        }
        Ok(())
    }

    /// 配置时区下的当前小时，时区非法时用默认时区
    pub fn local_hour(&self, now: DateTime<Utc>) -> i32 {
        let tz = parse_timezone(&self.timezone);
        now.with_timezone(&tz).hour() as i32
    }

    pub fn rules_for(&self, group: &str) -> Option<&GroupRuleSet> {
        if !self.enabled || self.mode == DynamicRatioMode::None {
            return None;
        }
        self.group_configs.get(group)
    }
}

/// 小时是否落在 [start, end)，start > end 时按跨午夜处理
pub fn is_hour_in_range(hour: i32, start: i32, end: i32) -> bool {
    if start <= end {
        return hour >= start && hour < end;
    }
    // 跨午夜，如 22:00 - 06:00
    hour >= start || hour < end
}

/// 动态倍率配置存储，写入时整体替换
#[derive(Debug, Default)]
pub struct DynamicRatioStore {
    current: RwLock<Arc<DynamicRatioConfig>>,
}

impl DynamicRatioStore {
    pub fn new(config: DynamicRatioConfig) -> Self {
        Self {
            current: RwLock::new(Arc::new(config)),
        }
    }

    pub fn get(&self) -> Arc<DynamicRatioConfig> {
        // 锁内只有完整的 Arc，中毒后继续读取是安全的
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn to_json(&self) -> String {
        let config = self.get();
        serde_json::to_string(config.as_ref()).unwrap_or_else(|e| {
            tracing::error!("Failed to serialize dynamic group ratio setting: {}", e);
            "{}".to_string()
        })
    }

    pub fn validate(payload: &str) -> Result<(), ValidationError> {
        DynamicRatioConfig::parse(payload).map(|_| ())
    }

    pub fn replace_from_json(&self, payload: &str) -> Result<(), ValidationError> {
        let config = DynamicRatioConfig::parse(payload)?;
        self.replace(config);
        Ok(())
    }

    pub fn replace(&self, config: DynamicRatioConfig) {
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(config);
    }
}
