/// 实验室 Agent 轮询协议的共享类型
///
/// Server 序列化任务增量，远端实验室 Agent 轮询获取并回报状态。
/// 状态码为双方约定的数值，不可随意更改。

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// 任务状态码
///
/// 状态由远端 Agent 推进: NEW(0) -> CURRENT(100) -> DONE(200)，失败为 ERROR(300)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum TaskStatus {
    New,
    Current,
    Done,
    Error,
}

impl TaskStatus {
    pub fn as_code(&self) -> i32 {
        match self {
            TaskStatus::New => 0,
            TaskStatus::Current => 100,
            TaskStatus::Done => 200,
            TaskStatus::Error => 300,
        }
    }
}

impl From<TaskStatus> for i32 {
    fn from(status: TaskStatus) -> Self {
        status.as_code()
    }
}

impl TryFrom<i32> for TaskStatus {
    type Error = String;

    fn try_from(code: i32) -> std::result::Result<Self, String> {
        match code {
            0 => Ok(TaskStatus::New),
            100 => Ok(TaskStatus::Current),
            200 => Ok(TaskStatus::Done),
            300 => Ok(TaskStatus::Error),
            other => Err(format!("未知的任务状态码: {}", other)),
        }
    }
}

/// 任务种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Hardware,
    Network,
    Software,
    Access,
    Snapshot,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Hardware => "hardware",
            TaskKind::Network => "network",
            TaskKind::Software => "software",
            TaskKind::Access => "access",
            TaskKind::Snapshot => "snapshot",
        }
    }
}

impl From<String> for TaskKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "hardware" => TaskKind::Hardware,
            "network" => TaskKind::Network,
            "software" => TaskKind::Software,
            "access" => TaskKind::Access,
            "snapshot" => TaskKind::Snapshot,
            _ => TaskKind::Hardware,
        }
    }
}

/// Agent 拉取到的单个作业
///
/// payload 按任务种类分组: kind -> (task_id -> 配置增量)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPayload {
    pub id: String,
    pub booking_id: String,
    pub complete: bool,
    pub payload: BTreeMap<String, BTreeMap<String, JsonValue>>,
}

/// Agent 回报的任务状态更新
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub status: TaskStatus,
    pub message: Option<String>,
    pub lab_token: String,
}

/// 作业摘要（列表接口）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: String,
    pub booking_id: String,
    pub complete: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_status_codes() {
        assert_eq!(TaskStatus::New.as_code(), 0);
        assert_eq!(TaskStatus::Current.as_code(), 100);
        assert_eq!(TaskStatus::Done.as_code(), 200);
        assert_eq!(TaskStatus::Error.as_code(), 300);
    }

    #[test]
    fn test_task_status_serde_as_integer() {
        let json = serde_json::to_string(&TaskStatus::Current).unwrap();
        assert_eq!(json, "100");

        let status: TaskStatus = serde_json::from_str("200").unwrap();
        assert_eq!(status, TaskStatus::Done);

        // 未约定的状态码应当被拒绝
        assert!(serde_json::from_str::<TaskStatus>("42").is_err());
    }

    #[test]
    fn test_task_kind_round_trip() {
        for kind in [
            TaskKind::Hardware,
            TaskKind::Network,
            TaskKind::Software,
            TaskKind::Access,
            TaskKind::Snapshot,
        ] {
            assert_eq!(TaskKind::from(kind.as_str().to_string()), kind);
        }
    }
}
