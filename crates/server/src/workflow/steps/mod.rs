/// 向导步骤

pub mod booking;
pub mod opnfv;
pub mod snapshot;
pub mod software;
pub mod template;

use serde_json::Value as JsonValue;

use super::repository::Repository;

/// 步骤状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Untouched,
    Invalid,
    Valid,
}

/// 向导中的一页
///
/// get_context 提供渲染数据，post 校验提交的表单并写入数据袋；
/// 校验失败返回错误消息，步骤标记为 Invalid
pub trait WorkflowStep: Send + Sync {
    fn id(&self) -> &'static str;

    fn title(&self) -> &'static str;

    fn description(&self) -> &'static str {
        ""
    }

    fn get_context(&self, repo: &Repository) -> JsonValue;

    fn post(&self, repo: &mut Repository, form: &JsonValue) -> Result<(), String>;
}

/// 通用确认步骤
///
/// 空表单即有效，存在与否只决定用户必须翻到最后一页才能提交
pub struct ConfirmStep;

impl WorkflowStep for ConfirmStep {
    fn id(&self) -> &'static str {
        "confirm"
    }

    fn title(&self) -> &'static str {
        "确认"
    }

    fn description(&self) -> &'static str {
        "核对所有信息后提交"
    }

    fn get_context(&self, repo: &Repository) -> JsonValue {
        serde_json::to_value(repo).unwrap_or(JsonValue::Null)
    }

    fn post(&self, _repo: &mut Repository, _form: &JsonValue) -> Result<(), String> {
        Ok(())
    }
}

/// 从表单里取字符串字段
pub(crate) fn form_str(form: &JsonValue, field: &str) -> Result<String, String> {
    form.get(field)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("缺少字段: {}", field))
}

/// 从表单里取可选字符串字段
pub(crate) fn form_str_opt(form: &JsonValue, field: &str) -> Option<String> {
    form.get(field)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
