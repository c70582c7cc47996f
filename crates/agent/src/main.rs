/// LaaS Dashboard - Lab Agent
///
/// 实验室侧代理程序，轮询 Dashboard 的作业接口，
/// 执行任务配置并逐个回报状态

mod client;
mod config;

use std::time::Duration;

use tracing::{error, info, warn};

use common::models::{JobPayload, TaskStatus};

use client::DashboardClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"))
        )
        .init();

    info!("🚀 启动 LaaS Lab Agent...");

    // 加载配置
    dotenvy::dotenv().ok();
    let cfg = config::Config::from_env()?;
    info!("✅ 配置加载成功 (实验室: {})", cfg.lab_name);

    let client = DashboardClient::new(&cfg.dashboard_url, &cfg.lab_name, &cfg.lab_token)?;

    // 启动即上报在线状态
    if let Err(e) = client.report_lab_status("up").await {
        warn!("上报实验室状态失败: {}", e);
    }

    info!("🎯 开始轮询 {} (间隔 {} 秒)", cfg.dashboard_url, cfg.poll_interval);

    let mut interval = tokio::time::interval(Duration::from_secs(cfg.poll_interval));
    loop {
        interval.tick().await;

        match client.fetch_new_jobs().await {
            Ok(jobs) => {
                for job in jobs {
                    if let Err(e) = process_job(&client, &job).await {
                        error!("处理作业 {} 失败: {}", job.id, e);
                    }
                }
            }
            Err(e) => warn!("拉取新作业失败: {}", e),
        }

        // 进行中作业的配置增量
        match client.fetch_current_jobs().await {
            Ok(jobs) => {
                for job in jobs {
                    if let Err(e) = process_job(&client, &job).await {
                        error!("处理作业 {} 失败: {}", job.id, e);
                    }
                }
            }
            Err(e) => warn!("拉取进行中作业失败: {}", e),
        }
    }
}

/// 执行一个作业里的全部任务并回报状态
///
/// 真实环境里这里会驱动装机、交换机配置等流程；
/// 参考实现按任务种类记录配置内容并直接回报完成
async fn process_job(client: &DashboardClient, job: &JobPayload) -> anyhow::Result<()> {
    info!("处理作业 {} (预约 {})", job.id, job.booking_id);

    for (kind, tasks) in &job.payload {
        for (task_id, config) in tasks {
            info!("执行 {} 任务 {}", kind, task_id);

            match apply_task(kind, config) {
                Ok(()) => {
                    client
                        .report_task_status(&job.id, task_id, TaskStatus::Done, None)
                        .await?;
                }
                Err(e) => {
                    warn!("任务 {} 执行失败: {}", task_id, e);
                    client
                        .report_task_status(
                            &job.id,
                            task_id,
                            TaskStatus::Error,
                            Some(e.to_string()),
                        )
                        .await?;
                }
            }
        }
    }

    Ok(())
}

/// 按任务种类应用配置
fn apply_task(kind: &str, config: &serde_json::Value) -> anyhow::Result<()> {
    match kind {
        "hardware" => {
            let hostname = config.get("hostname").and_then(|v| v.as_str()).unwrap_or("-");
            let image = config.get("image").and_then(|v| v.as_str()).unwrap_or("-");
            info!("装机: hostname={}, image={}", hostname, image);
        }
        "network" => {
            let count = config
                .get("interfaces")
                .and_then(|v| v.as_array())
                .map(|a| a.len())
                .unwrap_or(0);
            info!("网络配置: {} 块网卡", count);
        }
        "software" => {
            let installer = config.get("installer").and_then(|v| v.as_str()).unwrap_or("-");
            let scenario = config.get("scenario").and_then(|v| v.as_str()).unwrap_or("-");
            info!("软件部署: installer={}, scenario={}", installer, scenario);
        }
        "access" => {
            let access_type = config.get("access_type").and_then(|v| v.as_str()).unwrap_or("-");
            let user = config.get("user_id").and_then(|v| v.as_str()).unwrap_or("-");
            info!("访问配置: {} for {}", access_type, user);
        }
        "snapshot" => {
            let image_name = config.get("image_name").and_then(|v| v.as_str()).unwrap_or("-");
            info!("主机快照: {}", image_name);
        }
        other => {
            return Err(anyhow::anyhow!("未知任务种类: {}", other));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_apply_task_known_kinds() {
        assert!(apply_task("hardware", &json!({"hostname": "n1"})).is_ok());
        assert!(apply_task("network", &json!({"interfaces": []})).is_ok());
        assert!(apply_task("software", &json!({})).is_ok());
        assert!(apply_task("access", &json!({})).is_ok());
        assert!(apply_task("snapshot", &json!({})).is_ok());
    }

    #[test]
    fn test_apply_task_unknown_kind() {
        assert!(apply_task("firmware", &json!({})).is_err());
    }
}
