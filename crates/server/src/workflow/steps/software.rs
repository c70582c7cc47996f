/// 软件配置向导步骤

use serde_json::{json, Value as JsonValue};

use super::{form_str, WorkflowStep};
use crate::workflow::repository::Repository;

/// 镜像选择
pub struct ImageSelectStep;

impl WorkflowStep for ImageSelectStep {
    fn id(&self) -> &'static str {
        "image_select"
    }

    fn title(&self) -> &'static str {
        "选择镜像"
    }

    fn get_context(&self, repo: &Repository) -> JsonValue {
        json!({
            "image": repo.software.image,
        })
    }

    fn post(&self, repo: &mut Repository, form: &JsonValue) -> Result<(), String> {
        let image = form_str(form, "image")?;
        repo.software.image = Some(image);
        Ok(())
    }
}
