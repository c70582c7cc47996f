/// Dashboard 轮询客户端
///
/// 按实验室名拉取作业列表并回报任务状态，所有请求带 Lab-Token 头和超时

use std::time::Duration;

use common::models::{JobPayload, TaskStatus, TaskUpdate};
use tracing::debug;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct DashboardClient {
    base_url: String,
    lab_name: String,
    lab_token: String,
    client: reqwest::Client,
}

impl DashboardClient {
    pub fn new(base_url: &str, lab_name: &str, lab_token: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            lab_name: lab_name.to_string(),
            lab_token: lab_token.to_string(),
            client,
        })
    }

    fn jobs_url(&self, suffix: &str) -> String {
        format!(
            "{}/api/labs/{}/jobs/{}",
            self.base_url, self.lab_name, suffix
        )
    }

    /// 拉取新作业
    pub async fn fetch_new_jobs(&self) -> anyhow::Result<Vec<JobPayload>> {
        self.fetch_jobs("new").await
    }

    /// 拉取进行中作业的增量
    pub async fn fetch_current_jobs(&self) -> anyhow::Result<Vec<JobPayload>> {
        self.fetch_jobs("current").await
    }

    async fn fetch_jobs(&self, list: &str) -> anyhow::Result<Vec<JobPayload>> {
        let url = self.jobs_url(list);
        debug!("拉取作业列表: {}", url);

        let response = self
            .client
            .get(&url)
            .header("Lab-Token", &self.lab_token)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }

    /// 回报任务状态
    pub async fn report_task_status(
        &self,
        job_id: &str,
        task_id: &str,
        status: TaskStatus,
        message: Option<String>,
    ) -> anyhow::Result<()> {
        let url = self.jobs_url(&format!("{}/{}", job_id, task_id));
        let update = TaskUpdate {
            status,
            message,
            lab_token: self.lab_token.clone(),
        };

        self.client
            .post(&url)
            .header("Lab-Token", &self.lab_token)
            .json(&update)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }

    /// 上报实验室状态
    pub async fn report_lab_status(&self, status: &str) -> anyhow::Result<()> {
        let url = format!("{}/api/labs/{}/status", self.base_url, self.lab_name);

        self.client
            .post(&url)
            .header("Lab-Token", &self.lab_token)
            .json(&serde_json::json!({"status": status}))
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}
