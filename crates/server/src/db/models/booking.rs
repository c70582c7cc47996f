/// 预约数据模型

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use validator::Validate;

/// 预约模型
///
/// 保存时校验 start < end，且同一模板上的预约区间不得重叠（允许首尾相接）
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "bookings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub owner_id: String,
    pub collaborators: JsonValue,  // 用户 id 列表

    pub start: DateTimeWithTimeZone,
    pub end: DateTimeWithTimeZone,

    pub purpose: String,
    pub project: String,

    // 资源关联
    pub template_id: String,
    pub resource_id: Option<String>,  // 资源包，释放后置空
    pub job_id: Option<String>,

    // 剩余可延期次数与剩余可延期天数
    pub ext_count: i32,
    pub ext_days: i32,

    pub complete: bool,

    // 外部编排服务的关联键
    pub aggregate_id: Option<String>,

    // 缓存的描述文档
    pub pdf: Option<String>,
    pub idf: Option<String>,

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
        belongs_to = "super::resource_template::Entity",
        from = "Column::TemplateId",
        to = "super::resource_template::Column::Id"
    )]
    ResourceTemplate,

    #[sea_orm(
        belongs_to = "super::resource_bundle::Entity",
        from = "Column::ResourceId",
        to = "super::resource_bundle::Column::Id"
    )]
    ResourceBundle,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Owner.def()
    }
}

impl Related<super::resource_template::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ResourceTemplate.def()
    }
}

impl Related<super::resource_bundle::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ResourceBundle.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// 快速预约 DTO
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct QuickBookingDto {
    pub template_id: String,

    #[validate(length(min = 1, max = 300))]
    pub purpose: String,

    #[validate(length(min = 1, max = 100))]
    pub project: String,

    // 预约时长（天），策略允许 1-21 天
    #[validate(range(min = 1, max = 21))]
    pub length_days: i64,

    pub hostname: Option<String>,
    pub image: Option<String>,

    #[serde(default)]
    pub collaborators: Vec<String>,
}

/// 延长预约 DTO
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ExtendBookingDto {
    #[validate(range(min = 1, max = 21))]
    pub days: i64,
}

/// 预约响应 DTO
#[derive(Debug, Serialize, Deserialize)]
pub struct BookingResponse {
    pub id: String,
    pub owner_id: String,
    pub collaborators: JsonValue,
    pub start: DateTimeWithTimeZone,
    pub end: DateTimeWithTimeZone,
    pub purpose: String,
    pub project: String,
    pub template_id: String,
    pub resource_id: Option<String>,
    pub job_id: Option<String>,
    pub ext_count: i32,
    pub ext_days: i32,
    pub complete: bool,
    pub aggregate_id: Option<String>,
    pub created_at: DateTimeWithTimeZone,
}

impl From<Model> for BookingResponse {
    fn from(booking: Model) -> Self {
        Self {
            id: booking.id,
            owner_id: booking.owner_id,
            collaborators: booking.collaborators,
            start: booking.start,
            end: booking.end,
            purpose: booking.purpose,
            project: booking.project,
            template_id: booking.template_id,
            resource_id: booking.resource_id,
            job_id: booking.job_id,
            ext_count: booking.ext_count,
            ext_days: booking.ext_days,
            complete: booking.complete,
            aggregate_id: booking.aggregate_id,
            created_at: booking.created_at,
        }
    }
}

/// 预约列表响应
#[derive(Debug, Serialize, Deserialize)]
pub struct BookingListResponse {
    pub bookings: Vec<BookingResponse>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
}
