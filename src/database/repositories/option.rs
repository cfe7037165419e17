// 选项存储库
// options 表保存序列化后的配置，键为选项名

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{Error as SqlxError, FromRow, PgPool};

use crate::setting::registry::OptionStore;

#[derive(Debug, Clone, FromRow)]
pub struct OptionEntity {
    pub key: String,
    pub value: String,
}

pub struct OptionRepository {
    db: Arc<PgPool>,
}

impl OptionRepository {
    pub fn new(db: Arc<PgPool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl OptionStore for OptionRepository {
    async fn load_all(&self) -> Result<Vec<(String, String)>, SqlxError> {
        let rows = sqlx::query_as::<_, OptionEntity>(r#"SELECT key, value FROM options"#)
            .fetch_all(&*self.db)
            .await?;
        Ok(rows.into_iter().map(|o| (o.key, o.value)).collect())
    }

    async fn save(&self, key: &str, value: &str) -> Result<(), SqlxError> {
        sqlx::query(
            r#"
            INSERT INTO options (key, value)
            VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&*self.db)
        .await?;
        Ok(())
    }
}
