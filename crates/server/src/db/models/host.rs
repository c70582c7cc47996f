/// 物理主机数据模型

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 物理主机模型
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "hosts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub lab_id: String,
    pub profile_id: String,
    #[sea_orm(unique)]
    pub name: String,     // 主机名，须通过 is_valid_hostname 校验
    pub labid: String,    // 实验室内部编号

    // 状态
    pub booked: bool,     // 已被某个资源包占用
    pub working: bool,    // 硬件可用（false 表示维护中）
    pub bundle_id: Option<String>,

    // 时间戳
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::lab::Entity",
        from = "Column::LabId",
        to = "super::lab::Column::Id"
    )]
    Lab,

    #[sea_orm(
        belongs_to = "super::host_profile::Entity",
        from = "Column::ProfileId",
        to = "super::host_profile::Column::Id"
    )]
    HostProfile,

    #[sea_orm(
        belongs_to = "super::resource_bundle::Entity",
        from = "Column::BundleId",
        to = "super::resource_bundle::Column::Id"
    )]
    ResourceBundle,

    #[sea_orm(has_many = "super::interface::Entity")]
    Interface,
}

impl Related<super::lab::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Lab.def()
    }
}

impl Related<super::host_profile::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::HostProfile.def()
    }
}

impl Related<super::resource_bundle::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ResourceBundle.def()
    }
}

impl Related<super::interface::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Interface.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// 主机响应 DTO
#[derive(Debug, Serialize, Deserialize)]
pub struct HostResponse {
    pub id: String,
    pub lab_id: String,
    pub profile_id: String,
    pub name: String,
    pub labid: String,
    pub booked: bool,
    pub working: bool,
}

impl From<Model> for HostResponse {
    fn from(host: Model) -> Self {
        Self {
            id: host.id,
            lab_id: host.lab_id,
            profile_id: host.profile_id,
            name: host.name,
            labid: host.labid,
            booked: host.booked,
            working: host.working,
        }
    }
}

/// 主机列表响应
#[derive(Debug, Serialize, Deserialize)]
pub struct HostListResponse {
    pub hosts: Vec<HostResponse>,
    pub total: usize,
}
