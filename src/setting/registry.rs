//! 配置项注册表
//!
//! 管理端更新流程：校验 → 持久化 → 替换内存配置。校验失败不写库，写库失败不替换，
//! 任何失败都保留旧配置。多实例部署时由后台任务定期从库里重新加载。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{AppError, ValidationError};
use crate::setting::dynamic_ratio::DynamicRatioStore;
use crate::setting::group_ratio::{GroupSetting, GroupSettingStore};

pub const OPTION_DYNAMIC_GROUP_RATIO: &str = "DynamicGroupRatioSetting";

/// 配置项持久化
#[async_trait]
pub trait OptionStore: Send + Sync {
    async fn load_all(&self) -> Result<Vec<(String, String)>, sqlx::Error>;

    async fn save(&self, key: &str, value: &str) -> Result<(), sqlx::Error>;
}

pub struct SettingRegistry {
    dynamic: Arc<DynamicRatioStore>,
    groups: Arc<GroupSettingStore>,
    store: Arc<dyn OptionStore>,
    // 写库与替换内存配置必须成对完成
    update_lock: Mutex<()>,
}

impl SettingRegistry {
    pub fn new(
        dynamic: Arc<DynamicRatioStore>,
        groups: Arc<GroupSettingStore>,
        store: Arc<dyn OptionStore>,
    ) -> Self {
        Self {
            dynamic,
            groups,
            store,
            update_lock: Mutex::new(()),
        }
    }

    pub fn is_known(key: &str) -> bool {
        key == OPTION_DYNAMIC_GROUP_RATIO || GroupSetting::option_keys().contains(&key)
    }

    pub fn validate(&self, key: &str, payload: &str) -> Result<(), ValidationError> {
        if key == OPTION_DYNAMIC_GROUP_RATIO {
            DynamicRatioStore::validate(payload)
        } else {
            self.groups.validate(key, payload)
        }
    }

    pub async fn update(&self, key: &str, payload: &str) -> Result<(), AppError> {
        self.validate(key, payload)?;
        let _guard = self.update_lock.lock().await;
        self.store.save(key, payload).await?;
        self.apply(key, payload)?;
        tracing::info!("Option {} updated", key);
        Ok(())
    }

    fn apply(&self, key: &str, payload: &str) -> Result<(), ValidationError> {
        if key == OPTION_DYNAMIC_GROUP_RATIO {
            self.dynamic.replace_from_json(payload)
        } else {
            self.groups.update_option(key, payload)
        }
    }

    /// 从库里加载全部已知配置项，返回成功应用的数量
    pub async fn reload(&self) -> Result<usize, sqlx::Error> {
        let options = self.store.load_all().await?;
        let mut applied = 0;
        for (key, value) in options {
            if !Self::is_known(&key) {
                continue;
            }
            // 库里的非法值不覆盖当前配置
            match self.apply(&key, &value) {
                Ok(()) => applied += 1,
                Err(e) => tracing::warn!("Ignoring invalid stored option {}: {}", key, e),
            }
        }
        tracing::debug!("Reloaded {} options", applied);
        Ok(applied)
    }

    pub fn option_json(&self, key: &str) -> Option<String> {
        if key == OPTION_DYNAMIC_GROUP_RATIO {
            Some(self.dynamic_ratio_json())
        } else {
            self.groups.get().option_json(key)
        }
    }

    pub fn dynamic_ratio_json(&self) -> String {
        self.dynamic.to_json()
    }

    /// 后台定期重新加载
    pub fn spawn_sync(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // 第一次 tick 立即返回，启动时已加载过
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = self.reload().await {
                    tracing::error!("Failed to sync options: {}", e);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use crate::setting::dynamic_ratio::DynamicRatioMode;
    use crate::setting::group_ratio::OPTION_GROUP_RATIO;

    #[derive(Default)]
    struct MemoryStore {
        values: StdMutex<BTreeMap<String, String>>,
        fail_save: bool,
        /// 保存该值后暂停，模拟写库后的网络往返
        slow_value: Option<String>,
    }

    #[async_trait]
    impl OptionStore for MemoryStore {
        async fn load_all(&self) -> Result<Vec<(String, String)>, sqlx::Error> {
            let values = self.values.lock().unwrap();
            Ok(values.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        }

        async fn save(&self, key: &str, value: &str) -> Result<(), sqlx::Error> {
            if self.fail_save {
                return Err(sqlx::Error::PoolTimedOut);
            }
            self.values
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            if self.slow_value.as_deref() == Some(value) {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            Ok(())
        }
    }

    fn registry(store: Arc<MemoryStore>) -> SettingRegistry {
        SettingRegistry::new(
            Arc::new(DynamicRatioStore::default()),
            Arc::new(GroupSettingStore::default()),
            store,
        )
    }

    const RPM_PAYLOAD: &str = r#"{"enabled":true,"mode":"rpm","rpm_window_minutes":2,
        "group_configs":{"vip":{"rpm_ranges":[{"min_rpm":0,"max_rpm":-1,"ratio":2}]}}}"#;

    #[tokio::test]
    async fn update_persists_and_swaps() {
        let store = Arc::new(MemoryStore::default());
        let registry = registry(store.clone());

        registry
            .update(OPTION_DYNAMIC_GROUP_RATIO, RPM_PAYLOAD)
            .await
            .unwrap();
        assert!(store
            .values
            .lock()
            .unwrap()
            .contains_key(OPTION_DYNAMIC_GROUP_RATIO));
        assert_eq!(registry.dynamic.get().mode, DynamicRatioMode::Rpm);
        assert_eq!(registry.dynamic.get().rpm_window_minutes, 2);
    }

    #[tokio::test]
    async fn invalid_payload_is_not_persisted() {
        let store = Arc::new(MemoryStore::default());
        let registry = registry(store.clone());

        let bad = r#"{"enabled":true,"mode":"rpm","rpm_window_minutes":1,
            "group_configs":{"vip":{"rpm_ranges":[{"min_rpm":10,"max_rpm":5,"ratio":1}]}}}"#;
        let err = registry.update(OPTION_DYNAMIC_GROUP_RATIO, bad).await;
        assert!(matches!(
            err,
            Err(AppError::Validation(ValidationError::MaxRpmNotAbove { .. }))
        ));
        assert!(store.values.lock().unwrap().is_empty());
        assert_eq!(registry.dynamic.get().mode, DynamicRatioMode::None);
    }

    #[tokio::test]
    async fn failed_save_keeps_old_config() {
        let store = Arc::new(MemoryStore {
            fail_save: true,
            ..Default::default()
        });
        let registry = registry(store);

        let err = registry
            .update(OPTION_GROUP_RATIO, r#"{"default":3}"#)
            .await;
        assert!(matches!(err, Err(AppError::Database(_))));
        assert_eq!(registry.groups.get().group_ratio["default"], 1.0);
    }

    #[tokio::test]
    async fn unknown_key_rejected() {
        let registry = registry(Arc::new(MemoryStore::default()));
        assert_eq!(
            registry.validate("Nope", "{}"),
            Err(ValidationError::UnknownOption("Nope".into()))
        );
        assert!(registry.option_json("Nope").is_none());
    }

    #[tokio::test]
    async fn reload_skips_invalid_and_unknown() {
        let store = Arc::new(MemoryStore::default());
        {
            let mut values = store.values.lock().unwrap();
            values.insert(OPTION_GROUP_RATIO.into(), r#"{"default":1,"vip":4}"#.into());
            values.insert(OPTION_DYNAMIC_GROUP_RATIO.into(), "not json".into());
            values.insert("SMTPServer".into(), "smtp.example.com".into());
        }
        let registry = registry(store);

        assert_eq!(registry.reload().await.unwrap(), 1);
        assert_eq!(registry.groups.get().group_ratio["vip"], 4.0);
        assert_eq!(registry.dynamic.get().mode, DynamicRatioMode::None);
    }

    #[tokio::test]
    async fn option_json_round_trips() {
        let registry = registry(Arc::new(MemoryStore::default()));
        registry
            .update(OPTION_DYNAMIC_GROUP_RATIO, RPM_PAYLOAD)
            .await
            .unwrap();

        let json = registry.option_json(OPTION_DYNAMIC_GROUP_RATIO).unwrap();
        assert_eq!(json, registry.dynamic_ratio_json());
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["mode"], "rpm");
        assert_eq!(value["group_configs"]["vip"]["rpm_ranges"][0]["max_rpm"], -1);
    }

    #[tokio::test]
    async fn concurrent_updates_keep_store_and_memory_in_step() {
        let slow = r#"{"default":1,"vip":2}"#;
        let fast = r#"{"default":1,"vip":3}"#;
        let store = Arc::new(MemoryStore {
            slow_value: Some(slow.to_string()),
            ..Default::default()
        });
        let registry = Arc::new(registry(store.clone()));

        let first = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.update(OPTION_GROUP_RATIO, slow).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        registry.update(OPTION_GROUP_RATIO, fast).await.unwrap();
        first.await.unwrap().unwrap();

        let persisted: BTreeMap<String, f64> =
            serde_json::from_str(&store.values.lock().unwrap()[OPTION_GROUP_RATIO]).unwrap();
        assert_eq!(registry.groups.get().group_ratio, persisted);
        assert_eq!(persisted["vip"], 3.0);
    }
}
