/// 应用全局状态

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::liblaas::LibLaasClient;
use crate::workflow::SessionStore;

/// 应用状态
#[derive(Clone)]
pub struct AppState {
    /// SeaORM 数据库连接
    pub sea_db: DatabaseConnection,
    /// 向导会话仓库
    pub sessions: SessionStore,
    /// 外部编排服务客户端
    pub liblaas: Arc<LibLaasClient>,
}

impl AppState {
    pub fn new(sea_db: DatabaseConnection, liblaas: LibLaasClient) -> Self {
        Self {
            sea_db,
            sessions: SessionStore::new(),
            liblaas: Arc::new(liblaas),
        }
    }

    /// 获取 SeaORM 数据库连接（克隆）
    pub fn sea_db(&self) -> DatabaseConnection {
        self.sea_db.clone()
    }

    /// 获取向导会话仓库
    pub fn sessions(&self) -> SessionStore {
        self.sessions.clone()
    }

    /// 获取外部编排服务客户端
    pub fn liblaas(&self) -> Arc<LibLaasClient> {
        self.liblaas.clone()
    }
}
