/// 网卡数据模型

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// 网卡模型
///
/// config 保存当前下发的 VLAN 配置记录: [{vlan_id, tagged, public, network}]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "interfaces")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub host_id: String,
    pub name: String,         // 网卡名，如 eno1
    pub mac_address: String,
    pub bus_address: Option<String>,

    pub config: JsonValue,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::host::Entity",
        from = "Column::HostId",
        to = "super::host::Column::Id"
    )]
    Host,
}

impl Related<super::host::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Host.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// 单条 VLAN 配置记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VlanConfigEntry {
    pub vlan_id: i32,
    pub tagged: bool,
    pub public: bool,
    pub network: String,  // 模板内的网络名
}

/// 网卡响应 DTO
#[derive(Debug, Serialize, Deserialize)]
pub struct InterfaceResponse {
    pub id: String,
    pub host_id: String,
    pub name: String,
    pub mac_address: String,
    pub bus_address: Option<String>,
    pub config: JsonValue,
}

impl From<Model> for InterfaceResponse {
    fn from(iface: Model) -> Self {
        Self {
            id: iface.id,
            host_id: iface.host_id,
            name: iface.name,
            mac_address: iface.mac_address,
            bus_address: iface.bus_address,
            config: iface.config,
        }
    }
}
