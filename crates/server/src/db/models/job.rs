/// 部署作业数据模型

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 作业模型（每个预约一条）
///
/// 远端实验室 Agent 轮询作业并逐个任务回报状态
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "jobs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(unique)]
    pub booking_id: String,
    pub lab_id: String,

    pub complete: bool,

    // 时间戳
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::booking::Entity",
        from = "Column::BookingId",
        to = "super::booking::Column::Id"
    )]
    Booking,

    #[sea_orm(
        belongs_to = "super::lab::Entity",
        from = "Column::LabId",
        to = "super::lab::Column::Id"
    )]
    Lab,

    #[sea_orm(has_many = "super::task_config::Entity")]
    TaskConfig,
}

impl Related<super::booking::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Booking.def()
    }
}

impl Related<super::lab::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Lab.def()
    }
}

impl Related<super::task_config::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TaskConfig.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
