/// 模板构建向导步骤

use serde_json::{json, Value as JsonValue};

use common::utils::is_valid_hostname;

use super::{form_str, form_str_opt, WorkflowStep};
use crate::db::models::resource_template::{TemplateHostConfig, TemplateNetwork};
use crate::workflow::repository::Repository;

/// 模板基本信息
pub struct TemplateMetaStep;

impl WorkflowStep for TemplateMetaStep {
    fn id(&self) -> &'static str {
        "template_meta"
    }

    fn title(&self) -> &'static str {
        "模板信息"
    }

    fn get_context(&self, repo: &Repository) -> JsonValue {
        json!({
            "name": repo.template.name,
            "description": repo.template.description,
            "lab_id": repo.template.lab_id,
            "public": repo.template.public,
        })
    }

    fn post(&self, repo: &mut Repository, form: &JsonValue) -> Result<(), String> {
        let name = form_str(form, "name")?;
        let lab_id = form_str(form, "lab_id")?;

        repo.template.name = Some(name);
        repo.template.lab_id = Some(lab_id);
        repo.template.description = form_str_opt(form, "description");
        repo.template.public = form
            .get("public")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        Ok(())
    }
}

/// 模板主机定义
pub struct TemplateHostsStep;

impl WorkflowStep for TemplateHostsStep {
    fn id(&self) -> &'static str {
        "template_hosts"
    }

    fn title(&self) -> &'static str {
        "主机定义"
    }

    fn description(&self) -> &'static str {
        "为模板添加主机: 规格、主机名和接线方式"
    }

    fn get_context(&self, repo: &Repository) -> JsonValue {
        json!({
            "hosts": repo.template.hosts,
        })
    }

    fn post(&self, repo: &mut Repository, form: &JsonValue) -> Result<(), String> {
        let hosts: Vec<TemplateHostConfig> = form
            .get("hosts")
            .cloned()
            .ok_or_else(|| "缺少字段: hosts".to_string())
            .and_then(|v| {
                serde_json::from_value(v).map_err(|e| format!("主机定义格式错误: {}", e))
            })?;

        if hosts.is_empty() {
            return Err("模板必须至少包含一台主机".to_string());
        }

        for host in &hosts {
            if !is_valid_hostname(&host.hostname) {
                return Err(format!("非法主机名: {}", host.hostname));
            }
        }

        // 主机名不得重复
        let mut names: Vec<&str> = hosts.iter().map(|h| h.hostname.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        if names.len() != hosts.len() {
            return Err("模板内主机名不得重复".to_string());
        }

        repo.template.hosts = hosts;
        Ok(())
    }
}

/// 模板网络定义
pub struct TemplateNetworksStep;

impl WorkflowStep for TemplateNetworksStep {
    fn id(&self) -> &'static str {
        "template_networks"
    }

    fn title(&self) -> &'static str {
        "网络定义"
    }

    fn get_context(&self, repo: &Repository) -> JsonValue {
        json!({
            "networks": repo.template.networks,
        })
    }

    fn post(&self, repo: &mut Repository, form: &JsonValue) -> Result<(), String> {
        let networks: Vec<TemplateNetwork> = form
            .get("networks")
            .cloned()
            .ok_or_else(|| "缺少字段: networks".to_string())
            .and_then(|v| {
                serde_json::from_value(v).map_err(|e| format!("网络定义格式错误: {}", e))
            })?;

        // 主机接线引用的网络必须都有定义
        for host in &repo.template.hosts {
            for nets in host.interfaces.values() {
                for net in nets {
                    if !networks.iter().any(|n| &n.name == net) {
                        return Err(format!("主机 {} 引用了未定义的网络 {}", host.hostname, net));
                    }
                }
            }
        }

        repo.template.networks = networks;
        Ok(())
    }
}
