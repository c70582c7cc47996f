/// 资源包数据模型

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// 资源包模型
///
/// 模板针对一次预约的具体实例化结果，记录分配到的 VLAN；
/// 占用的主机通过 hosts.bundle_id 反向关联
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "resource_bundles")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub template_id: String,

    pub vlans: JsonValue,        // 网络名 -> 分配到的 vlan id
    pub assignments: JsonValue,  // host_id -> {hostname, image}

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::resource_template::Entity",
        from = "Column::TemplateId",
        to = "super::resource_template::Column::Id"
    )]
    ResourceTemplate,

    #[sea_orm(has_many = "super::host::Entity")]
    Host,
}

impl Related<super::resource_template::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ResourceTemplate.def()
    }
}

impl Related<super::host::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Host.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// 资源包响应 DTO
#[derive(Debug, Serialize, Deserialize)]
pub struct BundleResponse {
    pub id: String,
    pub template_id: String,
    pub vlans: JsonValue,
    pub hosts: Vec<super::host::HostResponse>,
}
