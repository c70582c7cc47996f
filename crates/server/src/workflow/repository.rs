/// 向导数据袋
///
/// 多步向导跨请求收集的全部表单数据都放在这里，确认提交时一次性落库。
/// 嵌套子向导完成后通过 result 把产物交还父向导。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

use crate::db::models::resource_template::{TemplateHostConfig, TemplateNetwork};

/// 预约部分
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookingSection {
    pub template_id: Option<String>,
    pub purpose: Option<String>,
    pub project: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub length_days: Option<i64>,
    pub collaborators: Vec<String>,
    pub hostname: Option<String>,
}

/// 模板构建部分
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateSection {
    pub name: Option<String>,
    pub description: Option<String>,
    pub lab_id: Option<String>,
    pub public: bool,
    pub hosts: Vec<TemplateHostConfig>,
    pub networks: Vec<TemplateNetwork>,
}

/// 软件配置部分
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SoftwareSection {
    pub image: Option<String>,
}

/// 快照部分
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotSection {
    pub booking_id: Option<String>,
    pub host_id: Option<String>,
    pub image_name: Option<String>,
    pub dashboard_visible: bool,
}

/// OPNFV 配置部分
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpnfvSection {
    pub installer: Option<String>,
    pub scenario: Option<String>,
    pub roles: BTreeMap<String, String>,
}

/// 向导会话的数据袋
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Repository {
    pub user_id: String,

    pub booking: BookingSection,
    pub template: TemplateSection,
    pub software: SoftwareSection,
    pub snapshot: SnapshotSection,
    pub opnfv: OpnfvSection,

    // 子向导的产物
    pub has_result: bool,
    pub result: Option<JsonValue>,
}

impl Repository {
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            ..Default::default()
        }
    }

    /// 子向导完成时写入产物
    pub fn set_result(&mut self, result: JsonValue) {
        self.result = Some(result);
        self.has_result = true;
    }

    /// 父向导取走产物
    pub fn take_result(&mut self) -> Option<JsonValue> {
        self.has_result = false;
        self.result.take()
    }
}
