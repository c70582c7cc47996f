/// 用户管理服务

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set};
use tracing::info;

use common::utils::{generate_id, generate_token};

use crate::app_state::AppState;
use crate::db::models::api_token::{
    ActiveModel as TokenActiveModel, Column as TokenColumn, Entity as TokenEntity, TokenResponse,
};
use crate::db::models::user::{
    ActiveModel as UserActiveModel, Column as UserColumn, Entity as UserEntity,
    UpdateProfileDto, UserListResponse, UserResponse,
};

pub struct UserService {
    state: AppState,
}

impl UserService {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// 获取用户资料
    pub async fn get_profile(&self, user_id: &str) -> anyhow::Result<UserResponse> {
        let user = UserEntity::find_by_id(user_id)
            .one(&self.state.sea_db())
            .await?
            .ok_or_else(|| anyhow::anyhow!("用户不存在: {}", user_id))?;
        Ok(UserResponse::from(user))
    }

    /// 更新用户资料
    pub async fn update_profile(
        &self,
        user_id: &str,
        dto: UpdateProfileDto,
    ) -> anyhow::Result<UserResponse> {
        let db = self.state.sea_db();

        let user = UserEntity::find_by_id(user_id)
            .one(&db)
            .await?
            .ok_or_else(|| anyhow::anyhow!("用户不存在: {}", user_id))?;

        let mut active: UserActiveModel = user.into();

        if let Some(full_name) = dto.full_name {
            active.full_name = Set(Some(full_name));
        }
        if let Some(company) = dto.company {
            active.company = Set(Some(company));
        }
        if let Some(timezone) = dto.timezone {
            active.timezone = Set(timezone);
        }
        let keys_changed = dto.ssh_public_keys.is_some();
        if let Some(keys) = dto.ssh_public_keys {
            active.ssh_public_keys = Set(serde_json::to_value(keys)?);
        }
        if let Some(pgp) = dto.pgp_public_key {
            active.pgp_public_key = Set(Some(pgp));
        }
        active.updated_at = Set(Utc::now().into());

        let updated = active.update(&db).await?;

        // 公钥变更同步到外部编排服务，失败只记日志
        if keys_changed {
            let state = self.state.clone();
            let username = updated.username.clone();
            let keys: Vec<String> = updated
                .ssh_public_keys
                .as_array()
                .map(|list| {
                    list.iter()
                        .filter_map(|k| k.as_str())
                        .map(|k| k.to_string())
                        .collect()
                })
                .unwrap_or_default();
            tokio::spawn(async move {
                state.liblaas().push_ssh_keys(&username, &keys).await;
            });
        }

        Ok(UserResponse::from(updated))
    }

    /// 用户列表（选择协作者用）
    pub async fn list_users(
        &self,
        page: usize,
        page_size: usize,
    ) -> anyhow::Result<UserListResponse> {
        let db = self.state.sea_db();

        let total = UserEntity::find().count(&db).await? as usize;
        let users = UserEntity::find()
            .order_by_asc(UserColumn::Username)
            .offset(((page.max(1) - 1) * page_size) as u64)
            .limit(page_size as u64)
            .all(&db)
            .await?;

        Ok(UserListResponse {
            users: users.into_iter().map(UserResponse::from).collect(),
            total,
            page,
            page_size,
        })
    }

    /// 用户当前的 API 令牌（没有则创建）
    pub async fn get_or_create_token(&self, user_id: &str) -> anyhow::Result<TokenResponse> {
        let db = self.state.sea_db();

        if let Some(token) = TokenEntity::find()
            .filter(TokenColumn::UserId.eq(user_id))
            .one(&db)
            .await?
        {
            return Ok(TokenResponse::from(token));
        }

        let active = TokenActiveModel {
            id: Set(generate_id()),
            user_id: Set(user_id.to_string()),
            token: Set(generate_token()),
            created_at: Set(Utc::now().into()),
        };
        let token = active.insert(&db).await?;
        info!("用户 {} 创建了 API 令牌", user_id);
        Ok(TokenResponse::from(token))
    }

    /// 为所有没有令牌的用户补发令牌
    ///
    /// 幂等: 重复执行后每个用户仍然只有一条令牌
    pub async fn create_tokens_for_all(&self) -> anyhow::Result<usize> {
        let db = self.state.sea_db();

        let users = UserEntity::find().all(&db).await?;
        let mut created = 0;

        for user in users {
            let existing = TokenEntity::find()
                .filter(TokenColumn::UserId.eq(user.id.clone()))
                .count(&db)
                .await?;
            if existing > 0 {
                continue;
            }

            let active = TokenActiveModel {
                id: Set(generate_id()),
                user_id: Set(user.id),
                token: Set(generate_token()),
                created_at: Set(Utc::now().into()),
            };
            active.insert(&db).await?;
            created += 1;
        }

        if created > 0 {
            info!("补发了 {} 条用户令牌", created);
        }
        Ok(created)
    }

    /// 按令牌解析用户 id（认证中间件用）
    pub async fn resolve_token(&self, token: &str) -> anyhow::Result<Option<String>> {
        let row = TokenEntity::find()
            .filter(TokenColumn::Token.eq(token))
            .one(&self.state.sea_db())
            .await?;
        Ok(row.map(|t| t.user_id))
    }
}
