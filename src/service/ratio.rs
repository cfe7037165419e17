use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::operations::rate_limit::{RateSource, RateSubject};
use crate::config::RpmSubject;
use crate::setting::dynamic_ratio::{DynamicRatioMode, DynamicRatioStore};
use crate::setting::group_ratio::GroupSettingStore;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EffectiveRatio {
    pub ratio: f64,
    pub is_dynamic: bool,
}

/// 倍率计算：动态倍率 > 分组对分组倍率 > 分组默认倍率
#[derive(Clone)]
pub struct RatioEngine {
    dynamic: Arc<DynamicRatioStore>,
    groups: Arc<GroupSettingStore>,
    rate_source: Arc<dyn RateSource>,
    rpm_subject: RpmSubject,
}

impl RatioEngine {
    pub fn new(
        dynamic: Arc<DynamicRatioStore>,
        groups: Arc<GroupSettingStore>,
        rate_source: Arc<dyn RateSource>,
        rpm_subject: RpmSubject,
    ) -> Self {
        Self {
            dynamic,
            groups,
            rate_source,
            rpm_subject,
        }
    }

    pub async fn effective_ratio(
        &self,
        caller_group: &str,
        target_group: &str,
        user_id: i64,
    ) -> EffectiveRatio {
        self.effective_ratio_at(caller_group, target_group, user_id, Utc::now())
            .await
    }

    pub async fn effective_ratio_at(
        &self,
        caller_group: &str,
        target_group: &str,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> EffectiveRatio {
        let subject = RateSubject::for_user(self.rpm_subject, user_id);
        self.resolve(caller_group, target_group, &subject, now).await
    }

    /// 指定采样对象计算倍率
    pub async fn resolve(
        &self,
        caller_group: &str,
        target_group: &str,
        subject: &RateSubject,
        now: DateTime<Utc>,
    ) -> EffectiveRatio {
        if let Some(ratio) = self.dynamic_ratio(target_group, subject, now).await {
            return EffectiveRatio {
                ratio,
                is_dynamic: true,
            };
        }

        EffectiveRatio {
            ratio: self.static_ratio(caller_group, target_group),
            is_dynamic: false,
        }
    }

    /// 动态倍率，未启用或无区间命中时返回 None
    pub async fn dynamic_ratio(
        &self,
        group: &str,
        subject: &RateSubject,
        now: DateTime<Utc>,
    ) -> Option<f64> {
        let config = self.dynamic.get();
        let rules = config.rules_for(group)?;

        match config.mode {
            DynamicRatioMode::Time => rules.time_ratio(config.local_hour(now)),
            DynamicRatioMode::Rpm => {
                if rules.rpm_ranges.is_empty() {
                    return None;
                }
                let rpm = self
                    .rate_source
                    .current_rate(subject, config.rpm_window_minutes)
                    .await;
                rules.rpm_ratio(rpm)
            }
            DynamicRatioMode::None => None,
        }
    }

    pub fn static_ratio(&self, caller_group: &str, target_group: &str) -> f64 {
        let setting = self.groups.get();
        if let Some(ratio) = setting.pair_ratio(caller_group, target_group) {
            return ratio;
        }
        match setting.group_ratio.get(target_group) {
            Some(ratio) => *ratio,
            None => {
                tracing::warn!("Group ratio not found: {}", target_group);
                1.0
            }
        }
    }

    pub async fn current_rate(&self, subject: &RateSubject) -> i64 {
        let window = self.dynamic.get().rpm_window_minutes;
        self.rate_source.current_rate(subject, window).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex;

    use crate::setting::group_ratio::{OPTION_GROUP_GROUP_RATIO, OPTION_GROUP_RATIO};

    /// 固定返回值并记录调用参数
    #[derive(Default)]
    pub(crate) struct FixedRate {
        pub rate: i64,
        pub calls: Mutex<Vec<(RateSubject, i64)>>,
    }

    impl FixedRate {
        pub fn new(rate: i64) -> Self {
            Self {
                rate,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RateSource for FixedRate {
        async fn current_rate(&self, subject: &RateSubject, window_minutes: i64) -> i64 {
            self.calls
                .lock()
                .unwrap()
                .push((subject.clone(), window_minutes));
            self.rate
        }
    }

    fn engine(dynamic_json: &str, rate: Arc<FixedRate>, subject: RpmSubject) -> RatioEngine {
        let dynamic = Arc::new(DynamicRatioStore::default());
        dynamic.replace_from_json(dynamic_json).unwrap();
        let groups = Arc::new(GroupSettingStore::default());
        groups
            .update_option(OPTION_GROUP_RATIO, r#"{"default":1,"vip":2}"#)
            .unwrap();
        groups
            .update_option(OPTION_GROUP_GROUP_RATIO, r#"{"svip":{"vip":1.5}}"#)
            .unwrap();
        RatioEngine::new(dynamic, groups, rate, subject)
    }

    const TIME_CONFIG: &str = r#"{"enabled":true,"mode":"time","rpm_window_minutes":1,"timezone":"Asia/Shanghai",
        "group_configs":{"vip":{"time_ranges":[{"start_hour":22,"end_hour":6,"ratio":0.5}]}}}"#;

    const RPM_CONFIG: &str = r#"{"enabled":true,"mode":"rpm","rpm_window_minutes":3,"timezone":"Asia/Shanghai",
        "group_configs":{"vip":{"rpm_ranges":[{"min_rpm":0,"max_rpm":10,"ratio":1},{"min_rpm":10,"max_rpm":-1,"ratio":3}]}}}"#;

    #[tokio::test]
    async fn time_mode_at_night_is_dynamic() {
        let engine = engine(TIME_CONFIG, Arc::new(FixedRate::new(0)), RpmSubject::User);
        // 15:00 UTC = 23:00 Asia/Shanghai
        let night = Utc.with_ymd_and_hms(2025, 3, 1, 15, 0, 0).unwrap();
        let r = engine.effective_ratio_at("default", "vip", 1, night).await;
        assert_eq!(r, EffectiveRatio { ratio: 0.5, is_dynamic: true });
    }

    #[tokio::test]
    async fn time_mode_at_noon_falls_through_to_static() {
        let engine = engine(TIME_CONFIG, Arc::new(FixedRate::new(0)), RpmSubject::User);
        let noon = Utc.with_ymd_and_hms(2025, 3, 1, 4, 0, 0).unwrap();
        let r = engine.effective_ratio_at("default", "vip", 1, noon).await;
        assert_eq!(r, EffectiveRatio { ratio: 2.0, is_dynamic: false });

        // 分组对分组倍率优先于默认倍率
        let r = engine.effective_ratio_at("svip", "vip", 1, noon).await;
        assert_eq!(r, EffectiveRatio { ratio: 1.5, is_dynamic: false });
    }

    #[tokio::test]
    async fn rpm_mode_samples_caller() {
        let rate = Arc::new(FixedRate::new(10));
        let engine = engine(RPM_CONFIG, rate.clone(), RpmSubject::User);
        let r = engine.effective_ratio("default", "vip", 42).await;
        assert_eq!(r, EffectiveRatio { ratio: 3.0, is_dynamic: true });
        assert_eq!(
            rate.calls.lock().unwrap().as_slice(),
            &[(RateSubject::User(42), 3)]
        );
    }

    #[tokio::test]
    async fn rpm_mode_samples_system_when_configured() {
        let rate = Arc::new(FixedRate::new(9));
        let engine = engine(RPM_CONFIG, rate.clone(), RpmSubject::System);
        let r = engine.effective_ratio("default", "vip", 42).await;
        assert_eq!(r, EffectiveRatio { ratio: 1.0, is_dynamic: true });
        assert_eq!(rate.calls.lock().unwrap()[0].0, RateSubject::System);
    }

    #[tokio::test]
    async fn group_without_rules_skips_sampling() {
        let rate = Arc::new(FixedRate::new(100));
        let engine = engine(RPM_CONFIG, rate.clone(), RpmSubject::User);
        let r = engine.effective_ratio("default", "default", 1).await;
        assert_eq!(r, EffectiveRatio { ratio: 1.0, is_dynamic: false });
        assert!(rate.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_group_defaults_to_one() {
        let engine = engine(
            r#"{"mode":"none","rpm_window_minutes":1}"#,
            Arc::new(FixedRate::new(0)),
            RpmSubject::User,
        );
        let r = engine.effective_ratio("default", "ghost", 1).await;
        assert_eq!(r, EffectiveRatio { ratio: 1.0, is_dynamic: false });
    }

    #[tokio::test]
    async fn unmatched_rpm_falls_through() {
        let config = r#"{"enabled":true,"mode":"rpm","rpm_window_minutes":1,
            "group_configs":{"vip":{"rpm_ranges":[{"min_rpm":50,"max_rpm":-1,"ratio":4}]}}}"#;
        let engine = engine(config, Arc::new(FixedRate::new(0)), RpmSubject::User);
        let r = engine.effective_ratio("default", "vip", 1).await;
        assert_eq!(r, EffectiveRatio { ratio: 2.0, is_dynamic: false });
    }
}
