/// OPNFV 配置向导步骤

use std::collections::BTreeMap;

use serde_json::{json, Value as JsonValue};

use super::{form_str, WorkflowStep};
use crate::workflow::repository::Repository;

/// 安装器与场景选择
pub struct OpnfvSelectStep;

impl WorkflowStep for OpnfvSelectStep {
    fn id(&self) -> &'static str {
        "opnfv_select"
    }

    fn title(&self) -> &'static str {
        "OPNFV 安装器"
    }

    fn get_context(&self, repo: &Repository) -> JsonValue {
        json!({
            "installer": repo.opnfv.installer,
            "scenario": repo.opnfv.scenario,
        })
    }

    fn post(&self, repo: &mut Repository, form: &JsonValue) -> Result<(), String> {
        repo.opnfv.installer = Some(form_str(form, "installer")?);
        repo.opnfv.scenario = Some(form_str(form, "scenario")?);
        Ok(())
    }
}

/// 主机角色分配
pub struct OpnfvRolesStep;

impl WorkflowStep for OpnfvRolesStep {
    fn id(&self) -> &'static str {
        "opnfv_roles"
    }

    fn title(&self) -> &'static str {
        "主机角色"
    }

    fn description(&self) -> &'static str {
        "为每台主机分配 jumphost / controller / compute 角色"
    }

    fn get_context(&self, repo: &Repository) -> JsonValue {
        json!({
            "roles": repo.opnfv.roles,
        })
    }

    fn post(&self, repo: &mut Repository, form: &JsonValue) -> Result<(), String> {
        let roles: BTreeMap<String, String> = form
            .get("roles")
            .cloned()
            .ok_or_else(|| "缺少字段: roles".to_string())
            .and_then(|v| {
                serde_json::from_value(v).map_err(|e| format!("角色分配格式错误: {}", e))
            })?;

        if roles.is_empty() {
            return Err("至少要为一台主机分配角色".to_string());
        }

        // 必须恰好一台 jumphost
        let jumphosts = roles.values().filter(|r| r.as_str() == "jumphost").count();
        if jumphosts != 1 {
            return Err(format!("必须恰好分配一台 jumphost，当前 {}", jumphosts));
        }

        repo.opnfv.roles = roles;
        Ok(())
    }
}
