/// 实验室数据模型

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 实验室模型
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "labs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(unique)]
    pub name: String,
    pub location: Option<String>,
    pub description: Option<String>,
    pub project: Option<String>,
    pub status: String,  // up, temp_down, down

    // 远端实验室 Agent 的认证令牌
    pub api_token: String,

    // 时间戳
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::host::Entity")]
    Host,

    #[sea_orm(has_many = "super::host_profile::Entity")]
    HostProfile,

    #[sea_orm(has_many = "super::public_network::Entity")]
    PublicNetwork,
}

impl Related<super::host::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Host.def()
    }
}

impl Related<super::host_profile::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::HostProfile.def()
    }
}

impl Related<super::public_network::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PublicNetwork.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// 实验室状态枚举
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum LabStatus {
    Up,
    TempDown,
    Down,
}

impl LabStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LabStatus::Up => "up",
            LabStatus::TempDown => "temp_down",
            LabStatus::Down => "down",
        }
    }
}

impl From<String> for LabStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "up" => LabStatus::Up,
            "temp_down" => LabStatus::TempDown,
            "down" => LabStatus::Down,
            _ => LabStatus::Down,
        }
    }
}

/// 实验室响应 DTO（不包含 api_token）
#[derive(Debug, Serialize, Deserialize)]
pub struct LabResponse {
    pub id: String,
    pub name: String,
    pub location: Option<String>,
    pub description: Option<String>,
    pub project: Option<String>,
    pub status: String,
    pub created_at: DateTimeWithTimeZone,
}

impl From<Model> for LabResponse {
    fn from(lab: Model) -> Self {
        Self {
            id: lab.id,
            name: lab.name,
            location: lab.location,
            description: lab.description,
            project: lab.project,
            status: lab.status,
            created_at: lab.created_at,
        }
    }
}

/// 实验室列表响应
#[derive(Debug, Serialize, Deserialize)]
pub struct LabListResponse {
    pub labs: Vec<LabResponse>,
    pub total: usize,
}
