/// 公网 VLAN 数据模型

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 公网 VLAN 模型
///
/// 公网网段逐条登记，与私有 VLAN 池分开管理
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "public_networks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub lab_id: String,
    pub vlan: i32,
    pub cidr: String,
    pub gateway: String,
    pub in_use: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::lab::Entity",
        from = "Column::LabId",
        to = "super::lab::Column::Id"
    )]
    Lab,
}

impl Related<super::lab::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Lab.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// 公网 VLAN 响应 DTO
#[derive(Debug, Serialize, Deserialize)]
pub struct PublicNetworkResponse {
    pub id: String,
    pub vlan: i32,
    pub cidr: String,
    pub gateway: String,
    pub in_use: bool,
}

impl From<Model> for PublicNetworkResponse {
    fn from(net: Model) -> Self {
        Self {
            id: net.id,
            vlan: net.vlan,
            cidr: net.cidr,
            gateway: net.gateway,
            in_use: net.in_use,
        }
    }
}
