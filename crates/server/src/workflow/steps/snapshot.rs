/// 快照向导步骤

use serde_json::{json, Value as JsonValue};

use common::utils::is_valid_hostname;

use super::{form_str, WorkflowStep};
use crate::workflow::repository::Repository;

/// 选择要打快照的主机
pub struct SnapshotHostStep;

impl WorkflowStep for SnapshotHostStep {
    fn id(&self) -> &'static str {
        "snapshot_host"
    }

    fn title(&self) -> &'static str {
        "选择主机"
    }

    fn description(&self) -> &'static str {
        "从自己的活动预约中选择一台主机"
    }

    fn get_context(&self, repo: &Repository) -> JsonValue {
        json!({
            "booking_id": repo.snapshot.booking_id,
            "host_id": repo.snapshot.host_id,
        })
    }

    fn post(&self, repo: &mut Repository, form: &JsonValue) -> Result<(), String> {
        repo.snapshot.booking_id = Some(form_str(form, "booking_id")?);
        repo.snapshot.host_id = Some(form_str(form, "host_id")?);
        Ok(())
    }
}

/// 快照信息
pub struct SnapshotMetaStep;

impl WorkflowStep for SnapshotMetaStep {
    fn id(&self) -> &'static str {
        "snapshot_meta"
    }

    fn title(&self) -> &'static str {
        "快照信息"
    }

    fn get_context(&self, repo: &Repository) -> JsonValue {
        json!({
            "image_name": repo.snapshot.image_name,
            "dashboard_visible": repo.snapshot.dashboard_visible,
        })
    }

    fn post(&self, repo: &mut Repository, form: &JsonValue) -> Result<(), String> {
        let image_name = form_str(form, "image_name")?;

        // 镜像名复用主机名的命名规则
        if !is_valid_hostname(&image_name) {
            return Err(format!("非法镜像名: {}", image_name));
        }

        repo.snapshot.image_name = Some(image_name);
        repo.snapshot.dashboard_visible = form
            .get("dashboard_visible")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        Ok(())
    }
}
