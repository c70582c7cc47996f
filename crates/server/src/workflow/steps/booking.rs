/// 预约向导步骤

use chrono::{Duration, Utc};
use serde_json::{json, Value as JsonValue};

use common::utils::is_valid_hostname;

use super::{form_str, form_str_opt, WorkflowStep};
use crate::services::booking_service::{MAX_BOOKING_DAYS, MIN_BOOKING_DAYS};
use crate::workflow::repository::Repository;

/// 选择资源模板
pub struct SelectTemplateStep;

impl WorkflowStep for SelectTemplateStep {
    fn id(&self) -> &'static str {
        "select_template"
    }

    fn title(&self) -> &'static str {
        "选择资源"
    }

    fn description(&self) -> &'static str {
        "从可用模板中选择要预约的 Pod"
    }

    fn get_context(&self, repo: &Repository) -> JsonValue {
        json!({
            "template_id": repo.booking.template_id,
        })
    }

    fn post(&self, repo: &mut Repository, form: &JsonValue) -> Result<(), String> {
        let template_id = form_str(form, "template_id")?;
        repo.booking.template_id = Some(template_id);
        Ok(())
    }
}

/// 预约信息（目的、项目、时长、协作者）
pub struct BookingMetaStep;

impl WorkflowStep for BookingMetaStep {
    fn id(&self) -> &'static str {
        "booking_meta"
    }

    fn title(&self) -> &'static str {
        "预约信息"
    }

    fn get_context(&self, repo: &Repository) -> JsonValue {
        json!({
            "purpose": repo.booking.purpose,
            "project": repo.booking.project,
            "length_days": repo.booking.length_days,
            "collaborators": repo.booking.collaborators,
            "hostname": repo.booking.hostname,
            "max_length_days": MAX_BOOKING_DAYS,
        })
    }

    fn post(&self, repo: &mut Repository, form: &JsonValue) -> Result<(), String> {
        let purpose = form_str(form, "purpose")?;
        let project = form_str(form, "project")?;

        let length_days = form
            .get("length_days")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| "缺少字段: length_days".to_string())?;
        if !(MIN_BOOKING_DAYS..=MAX_BOOKING_DAYS).contains(&length_days) {
            return Err(format!(
                "预约时长必须在 {}-{} 天之间",
                MIN_BOOKING_DAYS, MAX_BOOKING_DAYS
            ));
        }

        if let Some(hostname) = form_str_opt(form, "hostname") {
            if !is_valid_hostname(&hostname) {
                return Err(format!("非法主机名: {}", hostname));
            }
            repo.booking.hostname = Some(hostname);
        }

        let collaborators: Vec<String> = form
            .get("collaborators")
            .and_then(|v| v.as_array())
            .map(|list| {
                list.iter()
                    .filter_map(|v| v.as_str())
                    .map(|s| s.to_string())
                    .collect()
            })
            .unwrap_or_default();

        let start = Utc::now();
        repo.booking.purpose = Some(purpose);
        repo.booking.project = Some(project);
        repo.booking.length_days = Some(length_days);
        repo.booking.start = Some(start);
        repo.booking.end = Some(start + Duration::days(length_days));
        repo.booking.collaborators = collaborators;
        Ok(())
    }
}

/// 软件选择（镜像，可选）
pub struct BookingSoftwareStep;

impl WorkflowStep for BookingSoftwareStep {
    fn id(&self) -> &'static str {
        "booking_software"
    }

    fn title(&self) -> &'static str {
        "软件配置"
    }

    fn description(&self) -> &'static str {
        "选择部署到主机的系统镜像"
    }

    fn get_context(&self, repo: &Repository) -> JsonValue {
        json!({
            "image": repo.software.image,
        })
    }

    fn post(&self, repo: &mut Repository, form: &JsonValue) -> Result<(), String> {
        repo.software.image = form_str_opt(form, "image");
        Ok(())
    }
}
