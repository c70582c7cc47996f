/// 用户数据模型

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// 用户模型
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(unique)]
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub company: Option<String>,
    pub timezone: String,  // IANA 时区名，默认 UTC

    // 公钥
    pub ssh_public_keys: JsonValue,  // 字符串列表
    pub pgp_public_key: Option<String>,

    // 是否允许创建预约
    pub booking_privilege: bool,

    // 时间戳
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::api_token::Entity")]
    ApiToken,

    #[sea_orm(has_many = "super::booking::Entity")]
    Booking,
}

impl Related<super::api_token::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ApiToken.def()
    }
}

impl Related<super::booking::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Booking.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// 更新用户资料 DTO
#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateProfileDto {
    pub full_name: Option<String>,
    pub company: Option<String>,
    pub timezone: Option<String>,
    pub ssh_public_keys: Option<Vec<String>>,
    pub pgp_public_key: Option<String>,
}

/// 用户响应 DTO
#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub company: Option<String>,
    pub timezone: String,
    pub ssh_public_keys: JsonValue,
    pub pgp_public_key: Option<String>,
    pub booking_privilege: bool,
    pub created_at: DateTimeWithTimeZone,
}

impl From<Model> for UserResponse {
    fn from(user: Model) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            full_name: user.full_name,
            company: user.company,
            timezone: user.timezone,
            ssh_public_keys: user.ssh_public_keys,
            pgp_public_key: user.pgp_public_key,
            booking_privilege: user.booking_privilege,
            created_at: user.created_at,
        }
    }
}

/// 用户列表响应
#[derive(Debug, Serialize, Deserialize)]
pub struct UserListResponse {
    pub users: Vec<UserResponse>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
}
