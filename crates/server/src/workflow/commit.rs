/// 向导提交
///
/// 活动向导的所有步骤通过校验后，把数据袋内容真正落库。
/// 嵌套子向导提交后弹栈并把产物交还父向导，最外层向导提交后会话结束。

use serde_json::{json, Value as JsonValue};
use tracing::info;

use crate::app_state::AppState;
use crate::db::models::booking::BookingResponse;
use crate::db::models::resource_template::CreateTemplateDto;
use crate::services::booking_service::{BookingService, CreateBookingArgs};
use crate::services::job_service::{JobService, OpnfvSpec};
use crate::services::resource_service::ResourceService;

use super::repository::Repository;
use super::WorkflowKind;

/// 提交结果
#[derive(Debug, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommitOutcome {
    BookingCreated { booking: BookingResponse },
    TemplateCreated { template_id: String },
    SnapshotQueued { task_id: String },
    SectionStored { result: JsonValue },
}

/// 提交当前活动向导
pub async fn commit(
    state: &AppState,
    session_id: &str,
    user_id: &str,
) -> anyhow::Result<CommitOutcome> {
    let store = state.sessions();

    // 先在锁内取出提交所需的数据，再在锁外执行落库
    let (kind, repo, depth) = store
        .modify(session_id, user_id, |session| {
            if !session.active().all_valid() {
                return Err(anyhow::anyhow!("向导尚有步骤未通过校验"));
            }
            Ok((
                session.active().kind,
                session.repository.clone(),
                session.depth(),
            ))
        })
        .await??;

    let outcome = match kind {
        WorkflowKind::Booking => commit_booking(state, user_id, &repo).await?,
        WorkflowKind::ResourceTemplate => commit_template(state, user_id, &repo).await?,
        WorkflowKind::Snapshot => commit_snapshot(state, user_id, &repo).await?,
        WorkflowKind::SoftwareConfig => CommitOutcome::SectionStored {
            result: json!({"image": repo.software.image}),
        },
        WorkflowKind::OpnfvConfig => CommitOutcome::SectionStored {
            result: json!({
                "installer": repo.opnfv.installer,
                "scenario": repo.opnfv.scenario,
                "roles": repo.opnfv.roles,
            }),
        },
    };

    // 嵌套向导: 弹栈并移交产物；最外层向导: 会话结束
    if depth > 1 {
        let handoff = outcome_result(&outcome);
        store
            .modify(session_id, user_id, |session| {
                session.pop_workflow();
                apply_handoff(&mut session.repository, kind, &handoff);
                session.repository.set_result(handoff.clone());
            })
            .await?;
        info!("向导会话 {} 的子向导已提交并弹栈", session_id);
    } else {
        store.remove(session_id).await;
        info!("向导会话 {} 已提交完成", session_id);
    }

    Ok(outcome)
}

async fn commit_booking(
    state: &AppState,
    user_id: &str,
    repo: &Repository,
) -> anyhow::Result<CommitOutcome> {
    let template_id = repo
        .booking
        .template_id
        .clone()
        .ok_or_else(|| anyhow::anyhow!("未选择资源模板"))?;
    let purpose = repo
        .booking
        .purpose
        .clone()
        .ok_or_else(|| anyhow::anyhow!("未填写预约目的"))?;
    let project = repo
        .booking
        .project
        .clone()
        .ok_or_else(|| anyhow::anyhow!("未填写所属项目"))?;
    let start = repo
        .booking
        .start
        .ok_or_else(|| anyhow::anyhow!("未确定预约时间"))?;
    let end = repo
        .booking
        .end
        .ok_or_else(|| anyhow::anyhow!("未确定预约时间"))?;

    let opnfv = match (&repo.opnfv.installer, &repo.opnfv.scenario) {
        (Some(installer), Some(scenario)) => Some(OpnfvSpec {
            installer: installer.clone(),
            scenario: scenario.clone(),
            roles: repo.opnfv.roles.clone(),
        }),
        _ => None,
    };

    let booking_service = BookingService::new(state.clone());
    let booking = booking_service
        .create_booking(CreateBookingArgs {
            owner_id: user_id.to_string(),
            collaborators: repo.booking.collaborators.clone(),
            start: start.into(),
            end: end.into(),
            purpose,
            project,
            template_id,
            hostname: repo.booking.hostname.clone(),
            image: repo.software.image.clone(),
            opnfv,
        })
        .await?;

    Ok(CommitOutcome::BookingCreated {
        booking: BookingResponse::from(booking),
    })
}

async fn commit_template(
    state: &AppState,
    user_id: &str,
    repo: &Repository,
) -> anyhow::Result<CommitOutcome> {
    let name = repo
        .template
        .name
        .clone()
        .ok_or_else(|| anyhow::anyhow!("未填写模板名称"))?;
    let lab_id = repo
        .template
        .lab_id
        .clone()
        .ok_or_else(|| anyhow::anyhow!("未选择实验室"))?;

    let resource_service = ResourceService::new(state.clone());
    let template = resource_service
        .create_template(
            user_id,
            CreateTemplateDto {
                name,
                description: repo.template.description.clone(),
                lab_id,
                public: repo.template.public,
                host_configs: repo.template.hosts.clone(),
                networks: repo.template.networks.clone(),
            },
        )
        .await?;

    Ok(CommitOutcome::TemplateCreated {
        template_id: template.id,
    })
}

async fn commit_snapshot(
    state: &AppState,
    user_id: &str,
    repo: &Repository,
) -> anyhow::Result<CommitOutcome> {
    let booking_id = repo
        .snapshot
        .booking_id
        .clone()
        .ok_or_else(|| anyhow::anyhow!("未选择预约"))?;
    let host_id = repo
        .snapshot
        .host_id
        .clone()
        .ok_or_else(|| anyhow::anyhow!("未选择主机"))?;
    let image_name = repo
        .snapshot
        .image_name
        .clone()
        .ok_or_else(|| anyhow::anyhow!("未填写镜像名"))?;

    let job_service = JobService::new(state.clone());

    // 校验主机属于该用户的预约
    let hosts = job_service.booking_hosts(user_id, &booking_id).await?;
    if !hosts.contains(&host_id) {
        return Err(anyhow::anyhow!("主机 {} 不属于预约 {}", host_id, booking_id));
    }

    let task = job_service
        .create_snapshot_task(
            &booking_id,
            &host_id,
            &image_name,
            repo.snapshot.dashboard_visible,
        )
        .await?;

    Ok(CommitOutcome::SnapshotQueued { task_id: task.id })
}

/// 子向导交还给父向导的产物
fn outcome_result(outcome: &CommitOutcome) -> JsonValue {
    match outcome {
        CommitOutcome::BookingCreated { booking } => json!({"booking_id": booking.id}),
        CommitOutcome::TemplateCreated { template_id } => json!({"template_id": template_id}),
        CommitOutcome::SnapshotQueued { task_id } => json!({"task_id": task_id}),
        CommitOutcome::SectionStored { result } => result.clone(),
    }
}

/// 按子向导类型把产物写回父向导的数据袋
fn apply_handoff(repo: &mut Repository, kind: WorkflowKind, handoff: &JsonValue) {
    match kind {
        WorkflowKind::ResourceTemplate => {
            if let Some(template_id) = handoff.get("template_id").and_then(|v| v.as_str()) {
                repo.booking.template_id = Some(template_id.to_string());
            }
        }
        WorkflowKind::SoftwareConfig => {
            if let Some(image) = handoff.get("image").and_then(|v| v.as_str()) {
                repo.software.image = Some(image.to_string());
            }
        }
        // 其余类型只通过 result 交还
        _ => {}
    }
}
