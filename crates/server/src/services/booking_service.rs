/// 预约管理服务
///
/// 预约的不变量在这里集中维护: start < end，同一模板的预约区间不重叠
/// （首尾相接允许），快速预约时长 1-21 天，延期次数用尽后拒绝延期。

use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use sea_orm::prelude::DateTimeWithTimeZone;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use common::utils::is_valid_hostname;

use crate::app_state::AppState;
use crate::db::models::booking::{
    ActiveModel as BookingActiveModel, BookingListResponse, BookingResponse,
    Column as BookingColumn, Entity as BookingEntity, ExtendBookingDto, Model as BookingModel,
    QuickBookingDto,
};
use crate::db::models::user::{Column as UserColumn, Entity as UserEntity};
use crate::metrics;
use crate::services::job_service::JobService;
use crate::services::notify_service::NotifyService;
use crate::services::resource_service::ResourceService;

/// 快速预约允许的时长（天）
pub const MIN_BOOKING_DAYS: i64 = 1;
pub const MAX_BOOKING_DAYS: i64 = 21;

/// 新预约默认的剩余延期次数与剩余延期天数
pub const DEFAULT_EXT_COUNT: i32 = 2;
pub const DEFAULT_EXT_DAYS: i32 = 21;

pub struct BookingService {
    state: AppState,
}

impl BookingService {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// 快速预约: 校验 -> 实例化模板 -> 建预约 -> 建作业 -> 入队通知，单事务提交
    pub async fn quick_deploy(
        &self,
        owner_id: &str,
        dto: QuickBookingDto,
    ) -> anyhow::Result<BookingResponse> {
        dto.validate()
            .map_err(|e| anyhow::anyhow!("参数校验失败: {}", e))?;

        if let Some(ref hostname) = dto.hostname {
            if !is_valid_hostname(hostname) {
                return Err(anyhow::anyhow!("非法主机名: {}", hostname));
            }
        }

        let start = Utc::now();
        let end = start + Duration::days(dto.length_days);

        let booking = self
            .create_booking(CreateBookingArgs {
                owner_id: owner_id.to_string(),
                collaborators: dto.collaborators,
                start: start.into(),
                end: end.into(),
                purpose: dto.purpose,
                project: dto.project,
                template_id: dto.template_id,
                hostname: dto.hostname,
                image: dto.image,
                opnfv: None,
            })
            .await?;

        Ok(BookingResponse::from(booking))
    }

    /// 预约创建的共用路径（快速预约与向导确认都走这里）
    pub async fn create_booking(&self, args: CreateBookingArgs) -> anyhow::Result<BookingModel> {
        if args.start >= args.end {
            return Err(anyhow::anyhow!("预约开始时间必须早于结束时间"));
        }

        let db = self.state.sea_db();
        let resource_service = ResourceService::new(self.state.clone());
        let job_service = JobService::new(self.state.clone());
        let notify_service = NotifyService::new(self.state.clone());

        let owner = UserEntity::find_by_id(args.owner_id.clone())
            .one(&db)
            .await?
            .ok_or_else(|| anyhow::anyhow!("用户不存在: {}", args.owner_id))?;
        if !owner.booking_privilege {
            return Err(anyhow::anyhow!("用户 {} 没有预约权限", owner.username));
        }

        let template = resource_service.get_template(&args.template_id).await?;

        // 协作者按现存用户过滤
        let mut collaborators = Vec::new();
        for user_id in &args.collaborators {
            let exists = UserEntity::find()
                .filter(UserColumn::Id.eq(user_id.clone()))
                .count(&db)
                .await?
                > 0;
            if exists {
                collaborators.push(user_id.clone());
            } else {
                warn!("协作者 {} 不存在，已忽略", user_id);
            }
        }

        let txn = db.begin().await?;

        // 冲突检查和资源分配都在同一事务内
        assert_no_overlap(&txn, &args.template_id, args.start, args.end, None).await?;

        let bundle = resource_service.instantiate_template(&txn, &template).await?;

        let booking_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let pdf = render_descriptor(&template.name, &bundle.vlans);
        let idf = args.opnfv.as_ref().map(render_installer_descriptor);

        let booking_active = BookingActiveModel {
            id: Set(booking_id.clone()),
            owner_id: Set(args.owner_id.clone()),
            collaborators: Set(serde_json::to_value(&collaborators)?),
            start: Set(args.start),
            end: Set(args.end),
            purpose: Set(args.purpose.clone()),
            project: Set(args.project.clone()),
            template_id: Set(args.template_id.clone()),
            resource_id: Set(Some(bundle.id.clone())),
            job_id: Set(None),
            ext_count: Set(DEFAULT_EXT_COUNT),
            ext_days: Set(DEFAULT_EXT_DAYS),
            complete: Set(false),
            aggregate_id: Set(None),
            pdf: Set(Some(pdf)),
            idf: Set(idf),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };
        let booking = booking_active.insert(&txn).await?;

        let job = job_service
            .make_complete_job(
                &txn,
                &booking,
                &template,
                args.image.as_deref(),
                args.hostname.as_deref(),
                args.opnfv.as_ref(),
            )
            .await?;

        let mut booking_active: BookingActiveModel = booking.clone().into();
        booking_active.job_id = Set(Some(job.id.clone()));
        let booking = booking_active.update(&txn).await?;

        notify_service.booking_created(&txn, &booking).await?;

        txn.commit().await?;

        metrics::BOOKINGS_CREATED_TOTAL.inc();
        info!(
            "预约 {} 已创建 (模板 {}, 资源包 {}, 作业 {})",
            booking.id, args.template_id, bundle.id, job.id
        );

        // 事务提交后再同步外部编排服务，失败不影响本地预约
        let state = self.state.clone();
        let booking_for_sync = booking.clone();
        tokio::spawn(async move {
            if let Some(aggregate_id) = state
                .liblaas()
                .create_booking(&booking_for_sync.id, &booking_for_sync.purpose)
                .await
            {
                let mut active: BookingActiveModel = booking_for_sync.into();
                active.aggregate_id = Set(Some(aggregate_id));
                if let Err(e) = active.update(&state.sea_db()).await {
                    warn!("回写 aggregate_id 失败: {}", e);
                }
            }
        });

        Ok(booking)
    }

    /// 延长预约
    pub async fn extend_booking(
        &self,
        user_id: &str,
        booking_id: &str,
        dto: ExtendBookingDto,
    ) -> anyhow::Result<BookingResponse> {
        dto.validate()
            .map_err(|e| anyhow::anyhow!("参数校验失败: {}", e))?;

        let db = self.state.sea_db();
        let txn = db.begin().await?;

        let booking = BookingEntity::find_by_id(booking_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| anyhow::anyhow!("预约不存在: {}", booking_id))?;

        if booking.owner_id != user_id {
            return Err(anyhow::anyhow!("只有预约所有者可以延期"));
        }
        if booking.complete {
            return Err(anyhow::anyhow!("预约已结束，无法延期"));
        }

        check_extension(booking.ext_count, booking.ext_days, dto.days)?;

        let new_end = booking.end + Duration::days(dto.days);
        assert_no_overlap(
            &txn,
            &booking.template_id,
            booking.start,
            new_end,
            Some(&booking.id),
        )
        .await?;

        let ext_count = booking.ext_count - 1;
        let ext_days = booking.ext_days - dto.days as i32;
        let mut active: BookingActiveModel = booking.into();
        active.end = Set(new_end);
        active.ext_count = Set(ext_count);
        active.ext_days = Set(ext_days);
        active.updated_at = Set(Utc::now().into());
        let updated = active.update(&txn).await?;

        txn.commit().await?;

        info!("预约 {} 延长 {} 天，剩余延期次数 {}", booking_id, dto.days, ext_count);
        Ok(BookingResponse::from(updated))
    }

    /// 结束预约
    ///
    /// 只把 end 拉到当前时刻并标记完成，资源释放由后台轮询任务完成
    pub async fn end_booking(
        &self,
        user_id: &str,
        booking_id: &str,
    ) -> anyhow::Result<BookingResponse> {
        let db = self.state.sea_db();

        let booking = BookingEntity::find_by_id(booking_id)
            .one(&db)
            .await?
            .ok_or_else(|| anyhow::anyhow!("预约不存在: {}", booking_id))?;

        if booking.owner_id != user_id {
            return Err(anyhow::anyhow!("只有预约所有者可以结束预约"));
        }

        let booking_id_for_log = booking.id.clone();
        let aggregate_id = booking.aggregate_id.clone();
        let mut active: BookingActiveModel = booking.into();
        active.end = Set(Utc::now().into());
        active.complete = Set(true);
        active.updated_at = Set(Utc::now().into());
        let updated = active.update(&db).await?;

        // 通知外部编排服务，失败只记日志
        if let Some(aggregate_id) = aggregate_id {
            let state = self.state.clone();
            tokio::spawn(async move {
                state.liblaas().end_booking(&aggregate_id).await;
            });
        }

        info!("预约 {} 已标记结束", booking_id_for_log);
        Ok(BookingResponse::from(updated))
    }

    /// 用户的预约列表（自有 + 协作，按创建时间倒序分页）
    ///
    /// collaborators 是 JSON 列，协作关系的过滤在内存完成
    pub async fn list_bookings(
        &self,
        user_id: &str,
        page: usize,
        page_size: usize,
    ) -> anyhow::Result<BookingListResponse> {
        let db = self.state.sea_db();

        let bookings = BookingEntity::find()
            .order_by_desc(BookingColumn::CreatedAt)
            .all(&db)
            .await?;

        let visible: Vec<BookingModel> = bookings
            .into_iter()
            .filter(|b| b.owner_id == user_id || is_collaborator(b, user_id))
            .collect();

        let total = visible.len();
        let page_items = visible
            .into_iter()
            .skip((page.max(1) - 1) * page_size)
            .take(page_size)
            .map(BookingResponse::from)
            .collect();

        Ok(BookingListResponse {
            bookings: page_items,
            total,
            page,
            page_size,
        })
    }

    /// 预约详情（所有者和协作者可见）
    pub async fn get_booking(
        &self,
        user_id: &str,
        booking_id: &str,
    ) -> anyhow::Result<BookingResponse> {
        let booking = BookingEntity::find_by_id(booking_id)
            .one(&self.state.sea_db())
            .await?
            .ok_or_else(|| anyhow::anyhow!("预约不存在: {}", booking_id))?;

        if booking.owner_id != user_id && !is_collaborator(&booking, user_id) {
            return Err(anyhow::anyhow!("没有查看该预约的权限"));
        }

        Ok(BookingResponse::from(booking))
    }
}

/// 用户是否在预约的协作者列表里
fn is_collaborator(booking: &BookingModel, user_id: &str) -> bool {
    booking
        .collaborators
        .as_array()
        .map(|list| list.iter().any(|v| v.as_str() == Some(user_id)))
        .unwrap_or(false)
}

/// 预约创建参数
pub struct CreateBookingArgs {
    pub owner_id: String,
    pub collaborators: Vec<String>,
    pub start: DateTimeWithTimeZone,
    pub end: DateTimeWithTimeZone,
    pub purpose: String,
    pub project: String,
    pub template_id: String,
    pub hostname: Option<String>,
    pub image: Option<String>,
    pub opnfv: Option<crate::services::job_service::OpnfvSpec>,
}

/// 同一模板上不允许与现有预约重叠（区间按 [start, end) 比较，首尾相接允许）
async fn assert_no_overlap<C: ConnectionTrait>(
    db: &C,
    template_id: &str,
    start: DateTimeWithTimeZone,
    end: DateTimeWithTimeZone,
    exclude_booking: Option<&str>,
) -> anyhow::Result<()> {
    // 粗筛只留结束时间晚于新区间开始的预约，逐条用区间谓词判定
    let mut query = BookingEntity::find()
        .filter(BookingColumn::TemplateId.eq(template_id))
        .filter(BookingColumn::End.gt(start));

    if let Some(id) = exclude_booking {
        query = query.filter(BookingColumn::Id.ne(id));
    }

    let candidates = query.all(db).await?;
    let conflicts = candidates
        .iter()
        .filter(|b| dates_overlap(b.start, b.end, start, end))
        .count();

    if conflicts > 0 {
        return Err(common::errors::Error::BookingConflict(format!(
            "模板 {} 在该时间段已有 {} 个预约",
            template_id, conflicts
        ))
        .into());
    }
    Ok(())
}

/// 两个 [start, end) 区间是否重叠
pub fn dates_overlap(
    a_start: DateTimeWithTimeZone,
    a_end: DateTimeWithTimeZone,
    b_start: DateTimeWithTimeZone,
    b_end: DateTimeWithTimeZone,
) -> bool {
    a_start < b_end && b_start < a_end
}

/// 延期策略检查: 次数和天数预算都要有剩余
pub fn check_extension(ext_count: i32, ext_days: i32, days: i64) -> anyhow::Result<()> {
    if ext_count <= 0 {
        return Err(anyhow::anyhow!("延期次数已用尽"));
    }
    if !(MIN_BOOKING_DAYS..=MAX_BOOKING_DAYS).contains(&days) {
        return Err(anyhow::anyhow!(
            "延期时长必须在 {}-{} 天之间",
            MIN_BOOKING_DAYS,
            MAX_BOOKING_DAYS
        ));
    }
    if days > ext_days as i64 {
        return Err(anyhow::anyhow!(
            "剩余可延期天数不足: 需要 {}, 剩余 {}",
            days,
            ext_days
        ));
    }
    Ok(())
}

/// 渲染预约的资源描述文档（缓存到 booking.pdf）
pub fn render_descriptor(template_name: &str, vlans: &serde_json::Value) -> String {
    let details = serde_yaml::to_string(vlans).unwrap_or_default();
    format!(
        "version: 1.0\npod:\n  template: {}\n  networks:\n{}",
        template_name,
        indent(&details, 4)
    )
}

/// 渲染安装器描述文档（缓存到 booking.idf，仅 OPNFV 预约有）
pub fn render_installer_descriptor(spec: &crate::services::job_service::OpnfvSpec) -> String {
    let roles = spec
        .roles
        .iter()
        .map(|(host, role)| format!("    {}: {}", host, role))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "version: 1.0\ninstaller: {}\nscenario: {}\nroles:\n{}",
        spec.installer, spec.scenario, roles
    )
}

fn indent(text: &str, width: usize) -> String {
    let pad = " ".repeat(width);
    text.lines()
        .map(|line| format!("{}{}", pad, line))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(day: u32, hour: u32) -> DateTimeWithTimeZone {
        Utc.with_ymd_and_hms(2024, 6, day, hour, 0, 0).unwrap().into()
    }

    #[test]
    fn test_dates_overlap() {
        // 交叠
        assert!(dates_overlap(ts(1, 0), ts(5, 0), ts(4, 0), ts(8, 0)));
        // 包含
        assert!(dates_overlap(ts(1, 0), ts(10, 0), ts(4, 0), ts(5, 0)));
        // 完全分离
        assert!(!dates_overlap(ts(1, 0), ts(2, 0), ts(4, 0), ts(5, 0)));
    }

    #[test]
    fn test_dates_overlap_touching_allowed() {
        // 首尾相接不算重叠
        assert!(!dates_overlap(ts(1, 0), ts(5, 0), ts(5, 0), ts(8, 0)));
        assert!(!dates_overlap(ts(5, 0), ts(8, 0), ts(1, 0), ts(5, 0)));
    }

    #[test]
    fn test_check_extension_policy() {
        assert!(check_extension(2, 21, 7).is_ok());
        assert!(check_extension(1, 1, 1).is_ok());
        assert!(check_extension(1, 21, 21).is_ok());

        // 次数用尽
        assert!(check_extension(0, 21, 7).is_err());
        // 时长越界
        assert!(check_extension(2, 21, 0).is_err());
        assert!(check_extension(2, 21, 22).is_err());
        // 天数预算不足
        assert!(check_extension(2, 5, 7).is_err());
    }

    #[test]
    fn test_render_descriptor() {
        let vlans = serde_json::json!({"admin": 101, "public": 300});
        let pdf = render_descriptor("pod-2x", &vlans);
        assert!(pdf.starts_with("version: 1.0"));
        assert!(pdf.contains("template: pod-2x"));
        assert!(pdf.contains("admin: 101"));
    }

    #[test]
    fn test_is_collaborator_checks_json_list() {
        let booking = BookingModel {
            id: "b1".to_string(),
            owner_id: "u1".to_string(),
            collaborators: serde_json::json!(["u2", "u3"]),
            start: ts(1, 0),
            end: ts(8, 0),
            purpose: "ci".to_string(),
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
            created_at: ts(1, 0),
            updated_at: ts(1, 0),
        };

        assert!(is_collaborator(&booking, "u2"));
        assert!(is_collaborator(&booking, "u3"));
        assert!(!is_collaborator(&booking, "u9"));
        // 所有者身份不等于协作者身份
        assert!(!is_collaborator(&booking, "u1"));
    }

    #[test]
    fn test_render_installer_descriptor() {
        let spec = crate::services::job_service::OpnfvSpec {
            installer: "fuel".to_string(),
            scenario: "os-nosdn-nofeature-ha".to_string(),
            roles: std::collections::BTreeMap::from([
                ("node1".to_string(), "jumphost".to_string()),
                ("node2".to_string(), "controller".to_string()),
            ]),
        };
        let idf = render_installer_descriptor(&spec);
        assert!(idf.contains("installer: fuel"));
        assert!(idf.contains("node1: jumphost"));
        assert!(idf.contains("node2: controller"));
    }
}
