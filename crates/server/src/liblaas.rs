/// 外部编排服务 (LibLaaS) 客户端
///
/// 所有请求都带连接与整体超时，上游挂死不会拖住本地请求线程。
/// 调用失败只记日志并返回 None，不影响本地流程。

use std::time::Duration;

use serde_json::{json, Value as JsonValue};
use tracing::{info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

pub struct LibLaasClient {
    base_url: String,
    client: reqwest::Client,
}

impl LibLaasClient {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// 可用的硬件规格列表
    pub async fn flavors(&self) -> Option<JsonValue> {
        self.get_json("/api/flavor").await
    }

    /// 编排服务侧的模板列表
    pub async fn templates(&self) -> Option<JsonValue> {
        self.get_json("/api/template/list").await
    }

    /// 在编排服务创建预约，返回 aggregate_id
    pub async fn create_booking(&self, booking_id: &str, purpose: &str) -> Option<String> {
        let url = format!("{}/api/booking/create", self.base_url);
        let body = json!({
            "booking_id": booking_id,
            "purpose": purpose,
        });

        match self.client.post(&url).json(&body).send().await {
            Ok(response) if response.status().is_success() => {
                match response.json::<JsonValue>().await {
                    Ok(value) => {
                        let aggregate_id = value
                            .get("aggregate_id")
                            .and_then(|v| v.as_str())
                            .map(|s| s.to_string());
                        if let Some(ref id) = aggregate_id {
                            info!("编排服务已创建预约, aggregate_id={}", id);
                        }
                        aggregate_id
                    }
                    Err(e) => {
                        warn!("解析编排服务响应失败: {}", e);
                        None
                    }
                }
            }
            Ok(response) => {
                warn!("编排服务创建预约失败: HTTP {}", response.status());
                None
            }
            Err(e) => {
                warn!("请求编排服务失败: {}", e);
                None
            }
        }
    }

    /// 结束编排服务侧的预约
    pub async fn end_booking(&self, aggregate_id: &str) {
        let url = format!("{}/api/booking/{}/end", self.base_url, aggregate_id);
        match self.client.delete(&url).send().await {
            Ok(response) if response.status().is_success() => {
                info!("编排服务已结束预约 {}", aggregate_id);
            }
            Ok(response) => {
                warn!("编排服务结束预约失败: HTTP {}", response.status());
            }
            Err(e) => {
                warn!("请求编排服务失败: {}", e);
            }
        }
    }

    /// 推送用户的 SSH 公钥
    pub async fn push_ssh_keys(&self, username: &str, keys: &[String]) -> Option<()> {
        let url = format!("{}/api/user/{}/ssh", self.base_url, username);
        let body = json!({"keys": keys});

        match self.client.post(&url).json(&body).send().await {
            Ok(response) if response.status().is_success() => Some(()),
            Ok(response) => {
                warn!("推送 SSH 公钥失败: HTTP {}", response.status());
                None
            }
            Err(e) => {
                warn!("请求编排服务失败: {}", e);
                None
            }
        }
    }

    async fn get_json(&self, path: &str) -> Option<JsonValue> {
        let url = format!("{}{}", self.base_url, path);
        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                match response.json::<JsonValue>().await {
                    Ok(value) => Some(value),
                    Err(e) => {
                        warn!("解析编排服务响应失败: {}", e);
                        None
                    }
                }
            }
            Ok(response) => {
                warn!("编排服务请求 {} 失败: HTTP {}", path, response.status());
                None
            }
            Err(e) => {
                warn!("请求编排服务失败: {}", e);
                None
            }
        }
    }
}
