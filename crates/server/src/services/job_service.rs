/// 部署作业服务
///
/// 预约创建时展开为一组任务（硬件/网络/软件/访问），远端实验室 Agent
/// 轮询拉取后逐个回报状态。任务配置带脏字段追踪，Agent 每次只拿到
/// 自上次拉取以来变更过的字段。

use std::collections::BTreeMap;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::info;

use common::models::{JobPayload, TaskKind, TaskStatus, TaskUpdate};
use common::utils::generate_id;

use crate::app_state::AppState;
use crate::db::models::booking::{Column as BookingColumn, Entity as BookingEntity, Model as BookingModel};
use crate::db::models::host::{Column as HostColumn, Entity as HostEntity};
use crate::db::models::interface::{Column as InterfaceColumn, Entity as InterfaceEntity};
use crate::db::models::job::{
    ActiveModel as JobActiveModel, Column as JobColumn, Entity as JobEntity, Model as JobModel,
};
use crate::db::models::lab::Model as LabModel;
use crate::db::models::resource_bundle::Entity as BundleEntity;
use crate::db::models::resource_template::Model as TemplateModel;
use crate::db::models::task_config::{
    ActiveModel as TaskActiveModel, Column as TaskColumn, Entity as TaskEntity,
    Model as TaskModel, TaskConfigResponse,
};
use crate::metrics;

/// OPNFV 部署配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpnfvSpec {
    pub installer: String,
    pub scenario: String,
    /// 主机名 -> 角色 (jumphost / compute / controller)
    #[serde(default)]
    pub roles: BTreeMap<String, String>,
}

pub struct JobService {
    state: AppState,
}

impl JobService {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// 为预约展开完整作业
    ///
    /// 每台占用主机一条硬件任务和一条网络任务，所有者与每位协作者
    /// 各一条 vpn 和 ssh 访问任务，存在 OPNFV 配置时追加一条软件任务
    pub async fn make_complete_job<C: ConnectionTrait>(
        &self,
        db: &C,
        booking: &BookingModel,
        template: &TemplateModel,
        image_override: Option<&str>,
        hostname_override: Option<&str>,
        opnfv: Option<&OpnfvSpec>,
    ) -> anyhow::Result<JobModel> {
        let bundle_id = booking
            .resource_id
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("预约 {} 没有资源包", booking.id))?;

        let bundle = BundleEntity::find_by_id(bundle_id)
            .one(db)
            .await?
            .ok_or_else(|| anyhow::anyhow!("资源包不存在: {}", bundle_id))?;

        let hosts = HostEntity::find()
            .filter(HostColumn::BundleId.eq(bundle_id))
            .order_by_asc(HostColumn::Name)
            .all(db)
            .await?;

        let now = Utc::now();
        let job_active = JobActiveModel {
            id: Set(generate_id()),
            booking_id: Set(booking.id.clone()),
            lab_id: Set(template.lab_id.clone()),
            complete: Set(false),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };
        let job = job_active.insert(db).await?;

        // 硬件与网络任务（每台主机各一条）
        for (index, host) in hosts.iter().enumerate() {
            let assignment = bundle.assignments.get(&host.id);
            let assigned_hostname = assignment
                .and_then(|a| a.get("hostname"))
                .and_then(|v| v.as_str())
                .unwrap_or(&host.name);
            let assigned_image = assignment
                .and_then(|a| a.get("image"))
                .and_then(|v| v.as_str());

            // 单机预约允许覆盖第一台主机的部署主机名
            let hostname = if index == 0 && hosts.len() == 1 {
                hostname_override.unwrap_or(assigned_hostname)
            } else {
                assigned_hostname
            };
            let image = image_override.or(assigned_image);

            let mut hardware = TrackedConfig::new();
            hardware.set("hostname", JsonValue::from(hostname));
            hardware.set("image", serde_json::to_value(image)?);
            hardware.set("power", JsonValue::from("on"));
            hardware.set("ipmi_create", JsonValue::from(true));
            self.insert_task(db, &job.id, TaskKind::Hardware, Some(&host.id), hardware)
                .await?;

            let interfaces = InterfaceEntity::find()
                .filter(InterfaceColumn::HostId.eq(host.id.clone()))
                .order_by_asc(InterfaceColumn::Name)
                .all(db)
                .await?;
            let iface_configs: Vec<JsonValue> = interfaces
                .iter()
                .map(|iface| {
                    serde_json::json!({
                        "name": iface.name,
                        "mac_address": iface.mac_address,
                        "vlans": iface.config,
                    })
                })
                .collect();

            let mut network = TrackedConfig::new();
            network.set("interfaces", JsonValue::Array(iface_configs));
            self.insert_task(db, &job.id, TaskKind::Network, Some(&host.id), network)
                .await?;
        }

        // 访问任务
        let collaborators: Vec<String> =
            serde_json::from_value(booking.collaborators.clone()).unwrap_or_default();
        for (user_id, access_kind) in access_task_specs(&booking.owner_id, &collaborators) {
            let mut access = TrackedConfig::new();
            access.set("access_type", JsonValue::from(access_kind));
            access.set("user_id", JsonValue::from(user_id));
            access.set("revoke", JsonValue::from(false));
            access.set("booking_id", JsonValue::from(booking.id.as_str()));
            self.insert_task(db, &job.id, TaskKind::Access, None, access)
                .await?;
        }

        // 软件任务（仅 OPNFV 场景）
        if let Some(spec) = opnfv {
            let mut software = TrackedConfig::new();
            software.set("installer", JsonValue::from(spec.installer.as_str()));
            software.set("scenario", JsonValue::from(spec.scenario.as_str()));
            software.set("roles", serde_json::to_value(&spec.roles)?);
            self.insert_task(db, &job.id, TaskKind::Software, None, software)
                .await?;
        }

        info!("预约 {} 的作业 {} 已展开", booking.id, job.id);
        Ok(job)
    }

    async fn insert_task<C: ConnectionTrait>(
        &self,
        db: &C,
        job_id: &str,
        kind: TaskKind,
        host_id: Option<&str>,
        config: TrackedConfig,
    ) -> anyhow::Result<TaskModel> {
        let now = Utc::now();
        let task_active = TaskActiveModel {
            id: Set(generate_id()),
            job_id: Set(job_id.to_string()),
            kind: Set(kind.as_str().to_string()),
            host_id: Set(host_id.map(|s| s.to_string())),
            config: Set(config.config),
            delta_keys: Set(config.delta_keys),
            status: Set(TaskStatus::New.as_code()),
            message: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };
        Ok(task_active.insert(db).await?)
    }

    /// 为已有预约追加一条快照任务
    pub async fn create_snapshot_task(
        &self,
        booking_id: &str,
        host_id: &str,
        image_name: &str,
        dashboard_visible: bool,
    ) -> anyhow::Result<TaskModel> {
        let db = self.state.sea_db();

        let job = JobEntity::find()
            .filter(JobColumn::BookingId.eq(booking_id))
            .one(&db)
            .await?
            .ok_or_else(|| anyhow::anyhow!("预约 {} 没有作业", booking_id))?;

        let mut snapshot = TrackedConfig::new();
        snapshot.set("host_id", JsonValue::from(host_id));
        snapshot.set("image_name", JsonValue::from(image_name));
        snapshot.set("dashboard_visible", JsonValue::from(dashboard_visible));

        // 追加任务后作业重新进入未完成状态
        let mut job_active: JobActiveModel = job.clone().into();
        job_active.complete = Set(false);
        job_active.updated_at = Set(Utc::now().into());
        job_active.update(&db).await?;

        let task = self
            .insert_task(&db, &job.id, TaskKind::Snapshot, Some(host_id), snapshot)
            .await?;

        info!("预约 {} 追加快照任务 {}", booking_id, task.id);
        Ok(task)
    }

    /// Agent 拉取新任务
    ///
    /// 返回含 NEW 任务的作业，序列化后把这些任务标记为 CURRENT 并清空脏字段
    pub async fn jobs_new(&self, lab: &LabModel) -> anyhow::Result<Vec<JobPayload>> {
        self.collect_jobs(lab, TaskStatus::New, true).await
    }

    /// Agent 拉取进行中任务的增量
    pub async fn jobs_current(&self, lab: &LabModel) -> anyhow::Result<Vec<JobPayload>> {
        self.collect_jobs(lab, TaskStatus::Current, true).await
    }

    /// Agent 查看已完成任务
    pub async fn jobs_done(&self, lab: &LabModel) -> anyhow::Result<Vec<JobPayload>> {
        self.collect_jobs(lab, TaskStatus::Done, false).await
    }

    async fn collect_jobs(
        &self,
        lab: &LabModel,
        status: TaskStatus,
        advance: bool,
    ) -> anyhow::Result<Vec<JobPayload>> {
        let db = self.state.sea_db();

        let jobs = JobEntity::find()
            .filter(JobColumn::LabId.eq(lab.id.clone()))
            .order_by_asc(JobColumn::CreatedAt)
            .all(&db)
            .await?;

        let mut payloads = Vec::new();
        for job in jobs {
            let tasks = TaskEntity::find()
                .filter(TaskColumn::JobId.eq(job.id.clone()))
                .filter(TaskColumn::Status.eq(status.as_code()))
                .all(&db)
                .await?;

            if tasks.is_empty() {
                continue;
            }

            let mut payload: BTreeMap<String, BTreeMap<String, JsonValue>> = BTreeMap::new();
            for task in &tasks {
                let delta = delta_extract(&task.config, &task.delta_keys, &lab.api_token);
                payload
                    .entry(task.kind.clone())
                    .or_default()
                    .insert(task.id.clone(), delta);
            }

            if advance {
                // 拉取即视为交付: NEW -> CURRENT，脏字段清零
                for task in tasks {
                    let mut active: TaskActiveModel = task.into();
                    if status == TaskStatus::New {
                        active.status = Set(TaskStatus::Current.as_code());
                    }
                    active.delta_keys = Set(JsonValue::Array(vec![]));
                    active.updated_at = Set(Utc::now().into());
                    active.update(&db).await?;
                }
            }

            payloads.push(JobPayload {
                id: job.id,
                booking_id: job.booking_id,
                complete: job.complete,
                payload,
            });
        }

        Ok(payloads)
    }

    /// 单个作业的完整配置
    pub async fn get_job(&self, lab: &LabModel, job_id: &str) -> anyhow::Result<JobPayload> {
        let db = self.state.sea_db();

        let job = JobEntity::find_by_id(job_id)
            .filter(JobColumn::LabId.eq(lab.id.clone()))
            .one(&db)
            .await?
            .ok_or_else(|| anyhow::anyhow!("作业不存在: {}", job_id))?;

        let tasks = TaskEntity::find()
            .filter(TaskColumn::JobId.eq(job.id.clone()))
            .all(&db)
            .await?;

        let mut payload: BTreeMap<String, BTreeMap<String, JsonValue>> = BTreeMap::new();
        for task in &tasks {
            let mut full = task.config.clone();
            if let Some(map) = full.as_object_mut() {
                map.insert("lab_token".to_string(), JsonValue::from(lab.api_token.as_str()));
            }
            payload
                .entry(task.kind.clone())
                .or_default()
                .insert(task.id.clone(), full);
        }

        Ok(JobPayload {
            id: job.id,
            booking_id: job.booking_id,
            complete: job.complete,
            payload,
        })
    }

    /// Agent 回报单个任务状态
    pub async fn update_task(
        &self,
        lab: &LabModel,
        job_id: &str,
        task_id: &str,
        update: TaskUpdate,
    ) -> anyhow::Result<()> {
        if update.lab_token != lab.api_token {
            return Err(anyhow::anyhow!("lab_token 不匹配"));
        }

        let db = self.state.sea_db();

        let job = JobEntity::find_by_id(job_id)
            .filter(JobColumn::LabId.eq(lab.id.clone()))
            .one(&db)
            .await?
            .ok_or_else(|| anyhow::anyhow!("作业不存在: {}", job_id))?;

        let task = TaskEntity::find_by_id(task_id)
            .filter(TaskColumn::JobId.eq(job.id.clone()))
            .one(&db)
            .await?
            .ok_or_else(|| anyhow::anyhow!("任务不存在: {}", task_id))?;

        let mut active: TaskActiveModel = task.into();
        active.status = Set(update.status.as_code());
        active.message = Set(update.message);
        active.updated_at = Set(Utc::now().into());
        active.update(&db).await?;

        metrics::TASK_UPDATES_TOTAL.inc();

        // 所有任务完成后整个作业完成
        let unfinished = TaskEntity::find()
            .filter(TaskColumn::JobId.eq(job.id.clone()))
            .filter(TaskColumn::Status.ne(TaskStatus::Done.as_code()))
            .all(&db)
            .await?;

        if unfinished.is_empty() && !job.complete {
            let job_id_for_log = job.id.clone();
            let mut job_active: JobActiveModel = job.into();
            job_active.complete = Set(true);
            job_active.updated_at = Set(Utc::now().into());
            job_active.update(&db).await?;

            metrics::JOBS_COMPLETED_TOTAL.inc();
            info!("作业 {} 全部任务完成", job_id_for_log);
        }

        Ok(())
    }

    /// 预约对应的作业（面向用户的详情页）
    pub async fn job_for_booking(&self, booking_id: &str) -> anyhow::Result<Option<JobModel>> {
        Ok(JobEntity::find()
            .filter(JobColumn::BookingId.eq(booking_id))
            .one(&self.state.sea_db())
            .await?)
    }

    /// 作业的任务清单（面向用户的进度展示，不含配置内容）
    pub async fn tasks_for_job(&self, job_id: &str) -> anyhow::Result<Vec<TaskConfigResponse>> {
        let tasks = TaskEntity::find()
            .filter(TaskColumn::JobId.eq(job_id))
            .order_by_asc(TaskColumn::CreatedAt)
            .all(&self.state.sea_db())
            .await?;
        Ok(tasks.into_iter().map(TaskConfigResponse::from).collect())
    }

    /// 校验预约归属后返回其主机列表（快照向导用）
    pub async fn booking_hosts(
        &self,
        user_id: &str,
        booking_id: &str,
    ) -> anyhow::Result<Vec<String>> {
        let db = self.state.sea_db();

        let booking = BookingEntity::find()
            .filter(BookingColumn::Id.eq(booking_id))
            .filter(BookingColumn::OwnerId.eq(user_id))
            .one(&db)
            .await?
            .ok_or_else(|| anyhow::anyhow!("预约不存在或无权限: {}", booking_id))?;

        let Some(bundle_id) = booking.resource_id else {
            return Ok(vec![]);
        };

        let hosts = HostEntity::find()
            .filter(HostColumn::BundleId.eq(bundle_id))
            .all(&db)
            .await?;
        Ok(hosts.into_iter().map(|h| h.id).collect())
    }
}

/// 带脏字段追踪的任务配置
///
/// set 会把字段名记入 delta_keys（去重），Agent 取走增量后清空
#[derive(Debug, Clone, Default)]
pub struct TrackedConfig {
    pub config: JsonValue,
    pub delta_keys: JsonValue,
}

impl TrackedConfig {
    pub fn new() -> Self {
        Self {
            config: JsonValue::Object(Default::default()),
            delta_keys: JsonValue::Array(vec![]),
        }
    }

    pub fn set(&mut self, field: &str, value: JsonValue) {
        if let Some(map) = self.config.as_object_mut() {
            map.insert(field.to_string(), value);
        }
        if let Some(keys) = self.delta_keys.as_array_mut() {
            if !keys.iter().any(|k| k.as_str() == Some(field)) {
                keys.push(JsonValue::from(field));
            }
        }
    }

    pub fn clear_delta(&mut self) {
        self.delta_keys = JsonValue::Array(vec![]);
    }
}

/// 按脏字段列表抽取配置增量，并附带实验室令牌
pub fn delta_extract(config: &JsonValue, delta_keys: &JsonValue, lab_token: &str) -> JsonValue {
    let mut out = serde_json::Map::new();

    if let (Some(map), Some(keys)) = (config.as_object(), delta_keys.as_array()) {
        for key in keys {
            if let Some(field) = key.as_str() {
                if let Some(value) = map.get(field) {
                    out.insert(field.to_string(), value.clone());
                }
            }
        }
    }

    out.insert("lab_token".to_string(), JsonValue::from(lab_token));
    JsonValue::Object(out)
}

/// 访问任务的展开清单: (用户, 访问类型)，所有者与协作者去重
pub fn access_task_specs(owner_id: &str, collaborators: &[String]) -> Vec<(String, &'static str)> {
    let mut users: Vec<&str> = vec![owner_id];
    for user in collaborators {
        if !users.contains(&user.as_str()) {
            users.push(user);
        }
    }

    let mut specs = Vec::with_capacity(users.len() * 2);
    for user in users {
        specs.push((user.to_string(), "vpn"));
        specs.push((user.to_string(), "ssh"));
    }
    specs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracked_config_set_records_delta() {
        let mut config = TrackedConfig::new();
        config.set("hostname", JsonValue::from("node1"));
        config.set("power", JsonValue::from("on"));
        config.set("hostname", JsonValue::from("node2"));  // 重复字段不重复记录

        assert_eq!(config.config["hostname"], "node2");
        let keys = config.delta_keys.as_array().unwrap();
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn test_delta_extract_only_dirty_fields() {
        let mut config = TrackedConfig::new();
        config.set("hostname", JsonValue::from("node1"));
        config.set("power", JsonValue::from("on"));
        config.clear_delta();
        config.set("power", JsonValue::from("off"));

        let delta = delta_extract(&config.config, &config.delta_keys, "secret");
        let map = delta.as_object().unwrap();

        // 只有 power 变更过，外加 lab_token
        assert_eq!(map.len(), 2);
        assert_eq!(map["power"], "off");
        assert_eq!(map["lab_token"], "secret");
        assert!(!map.contains_key("hostname"));
    }

    #[test]
    fn test_delta_extract_after_clear_is_token_only() {
        let mut config = TrackedConfig::new();
        config.set("hostname", JsonValue::from("node1"));
        config.clear_delta();

        let delta = delta_extract(&config.config, &config.delta_keys, "secret");
        assert_eq!(delta.as_object().unwrap().len(), 1);
    }

    #[test]
    fn test_access_task_specs_fan_out() {
        let collaborators = vec!["u2".to_string(), "u3".to_string()];
        let specs = access_task_specs("u1", &collaborators);

        // 3 个用户 x {vpn, ssh}
        assert_eq!(specs.len(), 6);
        assert_eq!(specs.iter().filter(|(_, k)| *k == "vpn").count(), 3);
        assert_eq!(specs.iter().filter(|(_, k)| *k == "ssh").count(), 3);
    }

    #[test]
    fn test_access_task_specs_dedup_owner() {
        // 所有者同时出现在协作者列表时不重复展开
        let collaborators = vec!["u1".to_string(), "u2".to_string()];
        let specs = access_task_specs("u1", &collaborators);
        assert_eq!(specs.len(), 4);
    }
}
