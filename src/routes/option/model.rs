use serde::{Deserialize, Serialize};

/// 配置值统一以 JSON 字符串提交
#[derive(Debug, Deserialize)]
pub struct OptionPayload {
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct OptionInfo {
    pub key: String,
    pub value: String,
}
