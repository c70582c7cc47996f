/// 资源模板数据模型

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// 资源模板模型
///
/// 可复用的多机 Pod 描述，预约时按模板实例化为资源包
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "resource_templates")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub owner_id: String,
    pub lab_id: String,
    pub name: String,
    pub description: Option<String>,

    // public: 所有用户可见; hidden: 被引用后以隐藏代替删除
    pub public: bool,
    pub hidden: bool,

    pub host_configs: JsonValue,  // [{profile_id, hostname, image, interfaces: {网卡名: [网络名]}}]
    pub networks: JsonValue,      // [{name, public}]

    // 时间戳
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::OwnerId",
        to = "super::user::Column::Id"
    )]
    Owner,

    #[sea_orm(
        belongs_to = "super::lab::Entity",
        from = "Column::LabId",
        to = "super::lab::Column::Id"
    )]
    Lab,

    #[sea_orm(has_many = "super::resource_bundle::Entity")]
    ResourceBundle,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Owner.def()
    }
}

impl Related<super::lab::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Lab.def()
    }
}

impl Related<super::resource_bundle::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ResourceBundle.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// 模板中的单台主机配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateHostConfig {
    pub profile_id: String,
    pub hostname: String,
    pub image: Option<String>,
    /// 网卡名 -> 接入的网络名列表
    pub interfaces: std::collections::BTreeMap<String, Vec<String>>,
}

/// 模板中的网络定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateNetwork {
    pub name: String,
    pub public: bool,
}

/// 创建模板 DTO
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateTemplateDto {
    pub name: String,
    pub description: Option<String>,
    pub lab_id: String,
    pub public: bool,
    pub host_configs: Vec<TemplateHostConfig>,
    pub networks: Vec<TemplateNetwork>,
}

/// 模板响应 DTO
#[derive(Debug, Serialize, Deserialize)]
pub struct TemplateResponse {
    pub id: String,
    pub owner_id: String,
    pub lab_id: String,
    pub name: String,
    pub description: Option<String>,
    pub public: bool,
    pub host_configs: JsonValue,
    pub networks: JsonValue,
    pub created_at: DateTimeWithTimeZone,
}

impl From<Model> for TemplateResponse {
    fn from(template: Model) -> Self {
        Self {
            id: template.id,
            owner_id: template.owner_id,
            lab_id: template.lab_id,
            name: template.name,
            description: template.description,
            public: template.public,
            host_configs: template.host_configs,
            networks: template.networks,
            created_at: template.created_at,
        }
    }
}

/// 模板列表响应
#[derive(Debug, Serialize, Deserialize)]
pub struct TemplateListResponse {
    pub templates: Vec<TemplateResponse>,
    pub total: usize,
}
