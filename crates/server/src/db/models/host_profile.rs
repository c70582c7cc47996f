/// 主机规格数据模型

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// 主机规格模型
///
/// 描述一类物理机的硬件配置，预约模板按规格挑选主机
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "host_profiles")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub lab_id: String,
    pub name: String,
    pub description: Option<String>,

    // 硬件规格
    pub cpu: JsonValue,         // {arch, cores, cpus}
    pub ram_mb: i32,
    pub disks: JsonValue,       // [{name, size_gb, media_type, rotation}]
    pub interfaces: JsonValue,  // [{name, speed_mbps}]

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::lab::Entity",
        from = "Column::LabId",
        to = "super::lab::Column::Id"
    )]
    Lab,

    #[sea_orm(has_many = "super::host::Entity")]
    Host,
}

impl Related<super::lab::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Lab.def()
    }
}

impl Related<super::host::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Host.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// 主机规格响应 DTO
#[derive(Debug, Serialize, Deserialize)]
pub struct HostProfileResponse {
    pub id: String,
    pub lab_id: String,
    pub name: String,
    pub description: Option<String>,
    pub cpu: JsonValue,
    pub ram_mb: i32,
    pub disks: JsonValue,
    pub interfaces: JsonValue,
}

impl From<Model> for HostProfileResponse {
    fn from(profile: Model) -> Self {
        Self {
            id: profile.id,
            lab_id: profile.lab_id,
            name: profile.name,
            description: profile.description,
            cpu: profile.cpu,
            ram_mb: profile.ram_mb,
            disks: profile.disks,
            interfaces: profile.interfaces,
        }
    }
}
