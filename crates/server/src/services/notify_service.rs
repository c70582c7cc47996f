/// 通知服务
///
/// 预约生命周期事件（创建 / 即将到期 / 已结束）生成站内通知并入队邮件，
/// 去重标志保证每类事件对每个预约至多发送一次。

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use tracing::{info, warn};

use common::utils::generate_id;

use crate::app_state::AppState;
use crate::db::models::booking::Model as BookingModel;
use crate::db::models::booking_notify_state::{
    ActiveModel as NotifyStateActiveModel, Column as NotifyStateColumn,
    Entity as NotifyStateEntity, Model as NotifyStateModel,
};
use crate::db::models::notification::{
    ActiveModel as NotificationActiveModel, Column as NotificationColumn, EmailStatus,
    Entity as NotificationEntity, NotificationListResponse, NotificationResponse,
};
use crate::db::models::user::Entity as UserEntity;
use crate::metrics;

/// 邮件投递接口
///
/// 包内没有任何邮件依赖可循，默认实现只记录日志；部署方可以换成
/// 对接真实邮件网关的实现
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, recipient: &str, title: &str, body: &str) -> anyhow::Result<()>;
}

/// 默认投递器: 写日志
pub struct LogSender;

#[async_trait]
impl MessageSender for LogSender {
    async fn send(&self, recipient: &str, title: &str, body: &str) -> anyhow::Result<()> {
        info!("投递邮件 -> {}: {} ({} 字节)", recipient, title, body.len());
        Ok(())
    }
}

pub struct NotifyService {
    state: AppState,
}

impl NotifyService {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// 预约创建事件
    pub async fn booking_created<C: ConnectionTrait>(
        &self,
        db: &C,
        booking: &BookingModel,
    ) -> anyhow::Result<()> {
        let state = self.ensure_state(db, &booking.id).await?;
        if state.sent_created {
            return Ok(());
        }

        let title = format!("预约已创建: {}", booking.purpose);
        let body = render_created(booking);
        self.queue_for_booking_users(db, booking, &title, &body).await?;

        let mut active: NotifyStateActiveModel = state.into();
        active.sent_created = Set(true);
        active.update(db).await?;
        Ok(())
    }

    /// 预约即将到期事件
    pub async fn booking_ending_soon<C: ConnectionTrait>(
        &self,
        db: &C,
        booking: &BookingModel,
    ) -> anyhow::Result<()> {
        let state = self.ensure_state(db, &booking.id).await?;
        if state.sent_ending {
            return Ok(());
        }

        let title = format!("预约即将到期: {}", booking.purpose);
        let body = render_ending_soon(booking);
        self.queue_for_booking_users(db, booking, &title, &body).await?;

        let mut active: NotifyStateActiveModel = state.into();
        active.sent_ending = Set(true);
        active.update(db).await?;
        Ok(())
    }

    /// 预约结束事件
    pub async fn booking_ended<C: ConnectionTrait>(
        &self,
        db: &C,
        booking: &BookingModel,
    ) -> anyhow::Result<()> {
        let state = self.ensure_state(db, &booking.id).await?;
        if state.sent_ended {
            return Ok(());
        }

        let title = format!("预约已结束: {}", booking.purpose);
        let body = render_ended(booking);
        self.queue_for_booking_users(db, booking, &title, &body).await?;

        let mut active: NotifyStateActiveModel = state.into();
        active.sent_ended = Set(true);
        active.update(db).await?;
        Ok(())
    }

    /// 取出（或创建）预约的通知去重状态行
    async fn ensure_state<C: ConnectionTrait>(
        &self,
        db: &C,
        booking_id: &str,
    ) -> anyhow::Result<NotifyStateModel> {
        if let Some(state) = NotifyStateEntity::find()
            .filter(NotifyStateColumn::BookingId.eq(booking_id))
            .one(db)
            .await?
        {
            return Ok(state);
        }

        let active = NotifyStateActiveModel {
            id: Set(generate_id()),
            booking_id: Set(booking_id.to_string()),
            sent_created: Set(false),
            sent_ending: Set(false),
            sent_ended: Set(false),
        };
        Ok(active.insert(db).await?)
    }

    /// 给所有者和全部协作者入队通知
    async fn queue_for_booking_users<C: ConnectionTrait>(
        &self,
        db: &C,
        booking: &BookingModel,
        title: &str,
        body: &str,
    ) -> anyhow::Result<()> {
        let mut recipients = vec![booking.owner_id.clone()];
        if let Some(list) = booking.collaborators.as_array() {
            for user in list {
                if let Some(id) = user.as_str() {
                    if !recipients.iter().any(|r| r == id) {
                        recipients.push(id.to_string());
                    }
                }
            }
        }

        let now = Utc::now();
        for recipient in recipients {
            let active = NotificationActiveModel {
                id: Set(generate_id()),
                recipient_id: Set(recipient),
                booking_id: Set(Some(booking.id.clone())),
                title: Set(title.to_string()),
                message: Set(body.to_string()),
                for_end_user: Set(true),
                read: Set(false),
                email_status: Set(EmailStatus::Queued.as_str().to_string()),
                created_at: Set(now.into()),
            };
            active.insert(db).await?;
        }

        Ok(())
    }

    /// 投递所有排队中的邮件
    pub async fn dispatch_queued(&self, sender: &dyn MessageSender) -> anyhow::Result<usize> {
        let db = self.state.sea_db();

        let queued = NotificationEntity::find()
            .filter(NotificationColumn::EmailStatus.eq(EmailStatus::Queued.as_str()))
            .all(&db)
            .await?;

        let mut sent = 0;
        for notification in queued {
            let recipient = UserEntity::find_by_id(notification.recipient_id.clone())
                .one(&db)
                .await?;

            let Some(recipient) = recipient else {
                warn!("通知 {} 的接收者不存在，跳过", notification.id);
                continue;
            };

            if let Err(e) = sender
                .send(&recipient.email, &notification.title, &notification.message)
                .await
            {
                warn!("邮件投递失败 ({}): {}", recipient.email, e);
                continue;
            }

            let mut active: NotificationActiveModel = notification.into();
            active.email_status = Set(EmailStatus::Sent.as_str().to_string());
            active.update(&db).await?;

            metrics::NOTIFICATIONS_SENT_TOTAL.inc();
            sent += 1;
        }

        Ok(sent)
    }

    /// 用户的通知列表
    pub async fn list_notifications(
        &self,
        user_id: &str,
    ) -> anyhow::Result<NotificationListResponse> {
        let notifications = NotificationEntity::find()
            .filter(NotificationColumn::RecipientId.eq(user_id))
            .filter(NotificationColumn::ForEndUser.eq(true))
            .order_by_desc(NotificationColumn::CreatedAt)
            .all(&self.state.sea_db())
            .await?;

        let total = notifications.len();
        Ok(NotificationListResponse {
            notifications: notifications
                .into_iter()
                .map(NotificationResponse::from)
                .collect(),
            total,
        })
    }

    /// 标记通知已读
    pub async fn mark_read(&self, user_id: &str, notification_id: &str) -> anyhow::Result<()> {
        let db = self.state.sea_db();

        let notification = NotificationEntity::find_by_id(notification_id)
            .filter(NotificationColumn::RecipientId.eq(user_id))
            .one(&db)
            .await?
            .ok_or_else(|| anyhow::anyhow!("通知不存在: {}", notification_id))?;

        let mut active: NotificationActiveModel = notification.into();
        active.read = Set(true);
        active.update(&db).await?;
        Ok(())
    }
}

fn render_created(booking: &BookingModel) -> String {
    format!(
        "你的预约「{}」已创建。\n项目: {}\n起止: {} ~ {}\n资源部署完成后会再次通知。",
        booking.purpose, booking.project, booking.start, booking.end
    )
}

fn render_ending_soon(booking: &BookingModel) -> String {
    format!(
        "你的预约「{}」将于 {} 到期。\n如需继续使用请及时延期（剩余延期次数: {}）。",
        booking.purpose, booking.end, booking.ext_count
    )
}

fn render_ended(booking: &BookingModel) -> String {
    format!(
        "你的预约「{}」已结束，相关主机和网络资源已回收。\n感谢使用。",
        booking.purpose
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn booking() -> BookingModel {
        let start = chrono::Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let end = chrono::Utc.with_ymd_and_hms(2024, 6, 8, 0, 0, 0).unwrap();
        BookingModel {
            id: "b1".to_string(),
            owner_id: "u1".to_string(),
            collaborators: json!(["u2"]),
            start: start.into(),
            end: end.into(),
            purpose: "ci-testing".to_string(),
            project: "anuket".to_string(),
            template_id: "t1".to_string(),
            resource_id: None,
            job_id: None,
            ext_count: 2,
            ext_days: 21,
            complete: false,
            aggregate_id: None,
            pdf: None,
            idf: None,
            created_at: start.into(),
            updated_at: start.into(),
        }
    }

    #[test]
    fn test_render_bodies_mention_purpose() {
        let booking = booking();
        assert!(render_created(&booking).contains("ci-testing"));
        assert!(render_ending_soon(&booking).contains("ci-testing"));
        assert!(render_ended(&booking).contains("ci-testing"));
    }

    #[test]
    fn test_render_ending_soon_mentions_ext_count() {
        let body = render_ending_soon(&booking());
        assert!(body.contains("剩余延期次数: 2"));
    }
}
