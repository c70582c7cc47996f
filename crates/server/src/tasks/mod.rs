/// 后台周期任务
///
/// 预约到期回收、主机泄漏清扫、到期提醒、邮件投递，
/// 各自独立的 tokio 定时循环，单次失败只记日志不中断

use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set, TransactionTrait,
};
use tracing::{error, info};

use crate::app_state::AppState;
use crate::db::models::booking::{
    ActiveModel as BookingActiveModel, Column as BookingColumn, Entity as BookingEntity,
};
use crate::db::models::host::{
    ActiveModel as HostActiveModel, Column as HostColumn, Entity as HostEntity,
};
use crate::db::models::resource_bundle::Entity as BundleEntity;
use crate::services::notify_service::{LogSender, NotifyService};
use crate::services::resource_service::ResourceService;

const BOOKING_POLL_INTERVAL_SECS: u64 = 60;
const FREE_HOSTS_INTERVAL_SECS: u64 = 300;
const NOTIFY_EXPIRING_INTERVAL_SECS: u64 = 3600;
const DISPATCH_EMAILS_INTERVAL_SECS: u64 = 30;

/// 到期提醒的提前量
const EXPIRING_WINDOW_HOURS: i64 = 48;

/// 启动全部后台任务
pub fn start_background_tasks(state: AppState) {
    booking_poll(state.clone());
    free_hosts(state.clone());
    notify_expiring(state.clone());
    dispatch_emails(state);
    info!("后台周期任务已启动");
}

/// 回收到期预约的资源
fn booking_poll(state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(BOOKING_POLL_INTERVAL_SECS));

        loop {
            interval.tick().await;

            if let Err(e) = poll_expired_bookings(&state).await {
                error!("预约回收任务失败: {}", e);
            }
        }
    });
}

async fn poll_expired_bookings(state: &AppState) -> anyhow::Result<()> {
    let db = state.sea_db();
    let now = Utc::now();

    let expired = BookingEntity::find()
        .filter(BookingColumn::End.lte(now))
        .filter(BookingColumn::ResourceId.is_not_null())
        .all(&db)
        .await?;

    for booking in expired {
        let resource_service = ResourceService::new(state.clone());
        let notify_service = NotifyService::new(state.clone());

        let txn = db.begin().await?;

        if let Some(resource_id) = booking.resource_id.clone() {
            resource_service.release_bundle(&txn, &resource_id).await?;
        }

        let booking_id = booking.id.clone();
        let mut active: BookingActiveModel = booking.clone().into();
        active.resource_id = Set(None);
        active.complete = Set(true);
        active.updated_at = Set(Utc::now().into());
        let updated = active.update(&txn).await?;

        notify_service.booking_ended(&txn, &updated).await?;

        txn.commit().await?;
        info!("到期预约 {} 的资源已回收", booking_id);
    }

    Ok(())
}

/// 清扫泄漏的主机占用
fn free_hosts(state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(FREE_HOSTS_INTERVAL_SECS));

        loop {
            interval.tick().await;

            match sweep_leaked_hosts(&state).await {
                Ok(freed) if freed > 0 => info!("主机清扫: 释放了 {} 台泄漏主机", freed),
                Ok(_) => {}
                Err(e) => error!("主机清扫任务失败: {}", e),
            }
        }
    });
}

async fn sweep_leaked_hosts(state: &AppState) -> anyhow::Result<usize> {
    let db = state.sea_db();
    let mut freed = 0;

    let booked = HostEntity::find()
        .filter(HostColumn::Booked.eq(true))
        .all(&db)
        .await?;

    for host in booked {
        let leaked = match &host.bundle_id {
            // 占用标记还在但资源包关联已断
            None => true,
            Some(bundle_id) => BundleEntity::find_by_id(bundle_id.clone())
                .one(&db)
                .await?
                .is_none(),
        };

        if leaked {
            let name = host.name.clone();
            let mut active: HostActiveModel = host.into();
            active.booked = Set(false);
            active.bundle_id = Set(None);
            active.updated_at = Set(Utc::now().into());
            active.update(&db).await?;

            info!("释放泄漏主机 {}", name);
            freed += 1;
        }
    }

    Ok(freed)
}

/// 到期提醒
fn notify_expiring(state: AppState) {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(Duration::from_secs(NOTIFY_EXPIRING_INTERVAL_SECS));

        loop {
            interval.tick().await;

            if let Err(e) = queue_expiring_notifications(&state).await {
                error!("到期提醒任务失败: {}", e);
            }
        }
    });
}

async fn queue_expiring_notifications(state: &AppState) -> anyhow::Result<()> {
    let db = state.sea_db();
    let notify_service = NotifyService::new(state.clone());

    let now = Utc::now();
    let window_end = now + ChronoDuration::hours(EXPIRING_WINDOW_HOURS);

    let ending_soon = BookingEntity::find()
        .filter(BookingColumn::Complete.eq(false))
        .filter(BookingColumn::End.gt(now))
        .filter(BookingColumn::End.lte(window_end))
        .all(&db)
        .await?;

    for booking in ending_soon {
        // 去重标志在通知服务里维护，重复调用不会重发
        notify_service.booking_ending_soon(&db, &booking).await?;
    }

    Ok(())
}

/// 投递排队中的通知邮件
fn dispatch_emails(state: AppState) {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(Duration::from_secs(DISPATCH_EMAILS_INTERVAL_SECS));
        let sender = LogSender;

        loop {
            interval.tick().await;

            let notify_service = NotifyService::new(state.clone());
            match notify_service.dispatch_queued(&sender).await {
                Ok(sent) if sent > 0 => info!("邮件投递: 发送了 {} 封", sent),
                Ok(_) => {}
                Err(e) => error!("邮件投递任务失败: {}", e),
            }
        }
    });
}
