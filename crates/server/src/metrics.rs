/// Prometheus 指标

use once_cell::sync::Lazy;
use prometheus::{register_int_counter, Encoder, IntCounter, TextEncoder};

pub static BOOKINGS_CREATED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "laas_bookings_created_total",
        "创建成功的预约总数"
    )
    .expect("指标注册失败")
});

pub static JOBS_COMPLETED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "laas_jobs_completed_total",
        "全部任务完成的作业总数"
    )
    .expect("指标注册失败")
});

pub static TASK_UPDATES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "laas_task_updates_total",
        "远端 Agent 回报的任务状态更新总数"
    )
    .expect("指标注册失败")
});

pub static NOTIFICATIONS_SENT_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "laas_notifications_sent_total",
        "投递成功的通知邮件总数"
    )
    .expect("指标注册失败")
});

/// 按 Prometheus 文本格式导出所有指标
pub fn gather() -> String {
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_increment() {
        let before = BOOKINGS_CREATED_TOTAL.get();
        BOOKINGS_CREATED_TOTAL.inc();
        assert_eq!(BOOKINGS_CREATED_TOTAL.get(), before + 1);
    }

    #[test]
    fn test_gather_exposition_format() {
        TASK_UPDATES_TOTAL.inc();
        let output = gather();
        assert!(output.contains("laas_task_updates_total"));
    }
}
