/// 配置管理

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub dashboard_url: String,
    pub lab_name: String,
    pub lab_token: String,
    pub poll_interval: u64,
    pub log_level: String,
}

impl Config {
    /// 从环境变量加载配置
    pub fn from_env() -> anyhow::Result<Self> {
        let dashboard_url = std::env::var("DASHBOARD_URL")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());

        let lab_name = std::env::var("LAB_NAME")
            .map_err(|_| anyhow::anyhow!("必须设置 LAB_NAME 环境变量"))?;

        let lab_token = std::env::var("LAB_TOKEN")
            .map_err(|_| anyhow::anyhow!("必须设置 LAB_TOKEN 环境变量"))?;

        let poll_interval = std::env::var("POLL_INTERVAL")
            .unwrap_or_else(|_| "30".to_string())
            .parse()?;

        let log_level = std::env::var("LOG_LEVEL")
            .unwrap_or_else(|_| "debug".to_string());

        Ok(Self {
            dashboard_url,
            lab_name,
            lab_token,
            poll_interval,
            log_level,
        })
    }
}
