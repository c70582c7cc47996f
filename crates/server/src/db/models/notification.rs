/// 站内通知数据模型

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 通知模型
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notifications")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub recipient_id: String,
    pub booking_id: Option<String>,

    pub title: String,
    pub message: String,
    pub for_end_user: bool,

    pub read: bool,
    pub email_status: String,  // queued, sent

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::RecipientId",
        to = "super::user::Column::Id"
    )]
    Recipient,

    #[sea_orm(
        belongs_to = "super::booking::Entity",
        from = "Column::BookingId",
        to = "super::booking::Column::Id"
    )]
    Booking,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Recipient.def()
    }
}

impl Related<super::booking::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Booking.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// 邮件投递状态枚举
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum EmailStatus {
    Queued,
    Sent,
}

impl EmailStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailStatus::Queued => "queued",
            EmailStatus::Sent => "sent",
        }
    }
}

impl From<String> for EmailStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "queued" => EmailStatus::Queued,
            "sent" => EmailStatus::Sent,
            _ => EmailStatus::Queued,
        }
    }
}

/// 通知响应 DTO
#[derive(Debug, Serialize, Deserialize)]
pub struct NotificationResponse {
    pub id: String,
    pub booking_id: Option<String>,
    pub title: String,
    pub message: String,
    pub read: bool,
    pub created_at: DateTimeWithTimeZone,
}

impl From<Model> for NotificationResponse {
    fn from(notification: Model) -> Self {
        Self {
            id: notification.id,
            booking_id: notification.booking_id,
            title: notification.title,
            message: notification.message,
            read: notification.read,
            created_at: notification.created_at,
        }
    }
}

/// 通知列表响应
#[derive(Debug, Serialize, Deserialize)]
pub struct NotificationListResponse {
    pub notifications: Vec<NotificationResponse>,
    pub total: usize,
}
