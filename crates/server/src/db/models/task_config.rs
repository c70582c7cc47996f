/// 任务配置数据模型

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// 任务配置模型
///
/// 一个作业由若干任务组成，kind 区分硬件/网络/软件/访问/快照。
/// config 为完整配置，delta_keys 记录自上次被 Agent 拉取后变更过的字段名
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "task_configs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub job_id: String,
    pub kind: String,            // hardware, network, software, access, snapshot
    pub host_id: Option<String>,

    pub config: JsonValue,
    pub delta_keys: JsonValue,   // 字段名列表

    // 状态码: NEW(0), CURRENT(100), DONE(200), ERROR(300)
    pub status: i32,
    pub message: Option<String>,

    // 时间戳
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::job::Entity",
        from = "Column::JobId",
        to = "super::job::Column::Id"
    )]
    Job,

    #[sea_orm(
        belongs_to = "super::host::Entity",
        from = "Column::HostId",
        to = "super::host::Column::Id"
    )]
    Host,
}

impl Related<super::job::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Job.def()
    }
}

impl Related<super::host::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Host.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// 任务响应 DTO
#[derive(Debug, Serialize, Deserialize)]
pub struct TaskConfigResponse {
    pub id: String,
    pub job_id: String,
    pub kind: String,
    pub host_id: Option<String>,
    pub status: i32,
    pub message: Option<String>,
    pub updated_at: DateTimeWithTimeZone,
}

impl From<Model> for TaskConfigResponse {
    fn from(task: Model) -> Self {
        Self {
            id: task.id,
            job_id: task.job_id,
            kind: task.kind,
            host_id: task.host_id,
            status: task.status,
            message: task.message,
            updated_at: task.updated_at,
        }
    }
}
