/// 多步向导引擎
///
/// 一次向导会话持有一个数据袋 (Repository) 和一个工作流栈，
/// 栈支持嵌套子向导（例如预约途中临时创建新模板），
/// 所有步骤有效后确认提交，一次事务落库。

pub mod commit;
pub mod repository;
pub mod steps;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value as JsonValue};
use tokio::sync::RwLock;
use tracing::{info, warn};

use common::utils::generate_id;

use repository::Repository;
use steps::{
    booking::{BookingMetaStep, BookingSoftwareStep, SelectTemplateStep},
    opnfv::{OpnfvRolesStep, OpnfvSelectStep},
    snapshot::{SnapshotHostStep, SnapshotMetaStep},
    software::ImageSelectStep,
    template::{TemplateHostsStep, TemplateMetaStep, TemplateNetworksStep},
    ConfirmStep, StepStatus, WorkflowStep,
};

/// 向导类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    Booking,
    ResourceTemplate,
    SoftwareConfig,
    Snapshot,
    OpnfvConfig,
}

impl WorkflowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowKind::Booking => "booking",
            WorkflowKind::ResourceTemplate => "resource_template",
            WorkflowKind::SoftwareConfig => "software_config",
            WorkflowKind::Snapshot => "snapshot",
            WorkflowKind::OpnfvConfig => "opnfv_config",
        }
    }
}

/// 向导工厂: 每种向导的步骤顺序在这里写死
pub struct WorkflowFactory;

impl WorkflowFactory {
    pub fn create(kind: WorkflowKind) -> Vec<Box<dyn WorkflowStep>> {
        match kind {
            WorkflowKind::Booking => vec![
                Box::new(SelectTemplateStep),
                Box::new(BookingMetaStep),
                Box::new(BookingSoftwareStep),
                Box::new(ConfirmStep),
            ],
            WorkflowKind::ResourceTemplate => vec![
                Box::new(TemplateMetaStep),
                Box::new(TemplateHostsStep),
                Box::new(TemplateNetworksStep),
                Box::new(ConfirmStep),
            ],
            WorkflowKind::SoftwareConfig => vec![
                Box::new(ImageSelectStep),
                Box::new(ConfirmStep),
            ],
            WorkflowKind::Snapshot => vec![
                Box::new(SnapshotHostStep),
                Box::new(SnapshotMetaStep),
                Box::new(ConfirmStep),
            ],
            WorkflowKind::OpnfvConfig => vec![
                Box::new(OpnfvSelectStep),
                Box::new(OpnfvRolesStep),
                Box::new(ConfirmStep),
            ],
        }
    }
}

/// 一条进行中的向导
pub struct Workflow {
    pub kind: WorkflowKind,
    steps: Vec<Box<dyn WorkflowStep>>,
    statuses: Vec<StepStatus>,
    messages: Vec<Option<String>>,
    current: usize,
}

impl Workflow {
    pub fn new(kind: WorkflowKind) -> Self {
        let steps = WorkflowFactory::create(kind);
        let count = steps.len();
        Self {
            kind,
            steps,
            statuses: vec![StepStatus::Untouched; count],
            messages: vec![None; count],
            current: 0,
        }
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn status(&self, index: usize) -> StepStatus {
        self.statuses[index]
    }

    /// 当前步骤的渲染上下文
    pub fn step_context(&self, repo: &Repository) -> JsonValue {
        let step = &self.steps[self.current];
        let overview: Vec<JsonValue> = self
            .steps
            .iter()
            .zip(self.statuses.iter())
            .map(|(s, status)| {
                json!({
                    "id": s.id(),
                    "title": s.title(),
                    "status": status,
                })
            })
            .collect();

        json!({
            "workflow": self.kind.as_str(),
            "step_index": self.current_index(),
            "step_count": self.step_count(),
            "step": {
                "id": step.id(),
                "title": step.title(),
                "description": step.description(),
            },
            "status": self.status(self.current),
            "message": self.messages[self.current],
            "context": step.get_context(repo),
            "steps": overview,
        })
    }

    /// 向当前步骤提交表单
    pub fn post(&mut self, repo: &mut Repository, form: &JsonValue) -> StepStatus {
        match self.steps[self.current].post(repo, form) {
            Ok(()) => {
                self.statuses[self.current] = StepStatus::Valid;
                self.messages[self.current] = None;
            }
            Err(message) => {
                self.statuses[self.current] = StepStatus::Invalid;
                self.messages[self.current] = Some(message);
            }
        }
        self.statuses[self.current]
    }

    /// 前进一步，要求当前步骤已通过校验
    pub fn go_next(&mut self) -> Result<(), String> {
        if self.statuses[self.current] != StepStatus::Valid {
            return Err("当前步骤尚未通过校验".to_string());
        }
        if self.current + 1 >= self.steps.len() {
            return Err("已经是最后一步".to_string());
        }
        self.current += 1;
        Ok(())
    }

    /// 后退一步
    pub fn go_prev(&mut self) {
        self.current = self.current.saturating_sub(1);
    }

    /// 所有步骤是否都已通过校验
    pub fn all_valid(&self) -> bool {
        self.statuses.iter().all(|s| *s == StepStatus::Valid)
    }
}

/// 一次向导会话: 数据袋 + 工作流栈
pub struct SessionManager {
    pub id: String,
    pub repository: Repository,
    stack: Vec<Workflow>,
    touched: Instant,
}

impl SessionManager {
    pub fn new(kind: WorkflowKind, user_id: &str) -> Self {
        Self {
            id: generate_id(),
            repository: Repository::new(user_id),
            stack: vec![Workflow::new(kind)],
            touched: Instant::now(),
        }
    }

    pub fn touch(&mut self) {
        self.touched = Instant::now();
    }

    pub fn idle_secs(&self) -> u64 {
        self.touched.elapsed().as_secs()
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn active(&self) -> &Workflow {
        self.stack.last().expect("工作流栈不会为空")
    }

    pub fn active_mut(&mut self) -> &mut Workflow {
        self.stack.last_mut().expect("工作流栈不会为空")
    }

    /// 压入嵌套子向导
    pub fn add_workflow(&mut self, kind: WorkflowKind) {
        self.stack.push(Workflow::new(kind));
    }

    /// 弹出完成的子向导，回到父向导
    pub fn pop_workflow(&mut self) -> Option<Workflow> {
        if self.stack.len() > 1 {
            self.stack.pop()
        } else {
            None
        }
    }
}

/// 向导会话仓库（内存态）
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionManager>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// 新建会话，返回会话 id
    pub async fn create(&self, kind: WorkflowKind, user_id: &str) -> String {
        let session = SessionManager::new(kind, user_id);
        let id = session.id.clone();

        let mut sessions = self.sessions.write().await;
        sessions.insert(id.clone(), session);

        info!("向导会话 {} 已创建 ({})", id, kind.as_str());
        id
    }

    /// 在会话上执行操作（校验归属并刷新活跃时间）
    pub async fn modify<R>(
        &self,
        session_id: &str,
        user_id: &str,
        f: impl FnOnce(&mut SessionManager) -> R,
    ) -> anyhow::Result<R> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| anyhow::anyhow!("向导会话不存在: {}", session_id))?;

        if session.repository.user_id != user_id {
            return Err(anyhow::anyhow!("没有操作该会话的权限"));
        }

        session.touch();
        Ok(f(session))
    }

    /// 丢弃会话
    pub async fn remove(&self, session_id: &str) {
        let mut sessions = self.sessions.write().await;
        if sessions.remove(session_id).is_some() {
            info!("向导会话 {} 已移除", session_id);
        }
    }

    /// 清理长时间不活跃的会话
    pub async fn cleanup_idle_sessions(&self, timeout_secs: u64) -> Vec<String> {
        let mut sessions = self.sessions.write().await;
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| s.idle_secs() > timeout_secs)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            sessions.remove(id);
            warn!("向导会话 {} 闲置超时，已清理", id);
        }
        expired
    }

    /// 启动会话闲置清理任务
    pub fn start_session_sweeper(self, timeout_secs: u64, check_interval_secs: u64) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(check_interval_secs));

            loop {
                interval.tick().await;

                let removed = self.cleanup_idle_sessions(timeout_secs).await;
                if !removed.is_empty() {
                    info!("会话清理: 移除了 {} 个闲置会话", removed.len());
                }
            }
        });
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_booking_workflow_advances_on_valid_forms() {
        let mut repo = Repository::new("u1");
        let mut workflow = Workflow::new(WorkflowKind::Booking);

        assert_eq!(workflow.status(0), StepStatus::Untouched);

        // 未校验通过前不允许前进
        assert!(workflow.go_next().is_err());

        let status = workflow.post(&mut repo, &json!({"template_id": "t1"}));
        assert_eq!(status, StepStatus::Valid);
        workflow.go_next().unwrap();

        let status = workflow.post(
            &mut repo,
            &json!({
                "purpose": "ci",
                "project": "anuket",
                "length_days": 7,
                "collaborators": ["u2"],
            }),
        );
        assert_eq!(status, StepStatus::Valid);
        assert_eq!(repo.booking.length_days, Some(7));
        assert!(repo.booking.end.unwrap() > repo.booking.start.unwrap());
        workflow.go_next().unwrap();

        // 软件步骤镜像可选
        assert_eq!(workflow.post(&mut repo, &json!({})), StepStatus::Valid);
        workflow.go_next().unwrap();

        // 确认步骤
        assert_eq!(workflow.post(&mut repo, &json!({})), StepStatus::Valid);
        assert!(workflow.all_valid());
        assert!(workflow.go_next().is_err());
    }

    #[test]
    fn test_invalid_form_marks_step_invalid() {
        let mut repo = Repository::new("u1");
        let mut workflow = Workflow::new(WorkflowKind::Booking);
        workflow.post(&mut repo, &json!({"template_id": "t1"}));
        workflow.go_next().unwrap();

        // 时长越界
        let status = workflow.post(
            &mut repo,
            &json!({"purpose": "ci", "project": "anuket", "length_days": 30}),
        );
        assert_eq!(status, StepStatus::Invalid);
        assert!(workflow.go_next().is_err());

        // 修正后可以继续
        let status = workflow.post(
            &mut repo,
            &json!({"purpose": "ci", "project": "anuket", "length_days": 14}),
        );
        assert_eq!(status, StepStatus::Valid);
        assert!(workflow.go_next().is_ok());
    }

    #[test]
    fn test_go_prev_saturates_at_first_step() {
        let mut workflow = Workflow::new(WorkflowKind::SoftwareConfig);
        workflow.go_prev();
        assert_eq!(workflow.current_index(), 0);
    }

    #[test]
    fn test_nested_workflow_stack() {
        let mut session = SessionManager::new(WorkflowKind::Booking, "u1");
        assert_eq!(session.depth(), 1);

        // 预约途中嵌套模板创建
        session.add_workflow(WorkflowKind::ResourceTemplate);
        assert_eq!(session.depth(), 2);
        assert_eq!(session.active().kind, WorkflowKind::ResourceTemplate);

        let popped = session.pop_workflow().unwrap();
        assert_eq!(popped.kind, WorkflowKind::ResourceTemplate);
        assert_eq!(session.depth(), 1);
        assert_eq!(session.active().kind, WorkflowKind::Booking);

        // 最外层向导不可弹出
        assert!(session.pop_workflow().is_none());
    }

    #[test]
    fn test_repository_result_hand_off() {
        let mut repo = Repository::new("u1");
        assert!(!repo.has_result);

        repo.set_result(json!({"template_id": "t9"}));
        assert!(repo.has_result);

        let result = repo.take_result().unwrap();
        assert_eq!(result["template_id"], "t9");
        assert!(!repo.has_result);
        assert!(repo.take_result().is_none());
    }

    #[test]
    fn test_template_workflow_rejects_undefined_network() {
        let mut repo = Repository::new("u1");
        let mut workflow = Workflow::new(WorkflowKind::ResourceTemplate);

        workflow.post(&mut repo, &json!({"name": "pod", "lab_id": "lab1"}));
        workflow.go_next().unwrap();

        workflow.post(
            &mut repo,
            &json!({
                "hosts": [{
                    "profile_id": "p1",
                    "hostname": "node1",
                    "image": null,
                    "interfaces": {"eno1": ["admin"]}
                }]
            }),
        );
        workflow.go_next().unwrap();

        // admin 网络没有定义
        let status = workflow.post(&mut repo, &json!({"networks": []}));
        assert_eq!(status, StepStatus::Invalid);

        let status = workflow.post(
            &mut repo,
            &json!({"networks": [{"name": "admin", "public": false}]}),
        );
        assert_eq!(status, StepStatus::Valid);
    }
}
