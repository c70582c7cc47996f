/// 实验室服务

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use tracing::info;

use crate::app_state::AppState;
use crate::db::models::host::{Column as HostColumn, Entity as HostEntity, HostListResponse, HostResponse};
use crate::db::models::host_profile::{
    Column as ProfileColumn, Entity as ProfileEntity, HostProfileResponse,
};
use crate::db::models::interface::{
    Column as InterfaceColumn, Entity as InterfaceEntity, InterfaceResponse,
};
use crate::db::models::lab::{
    ActiveModel as LabActiveModel, Column as LabColumn, Entity as LabEntity, LabListResponse,
    LabResponse, LabStatus, Model as LabModel,
};
use crate::db::models::public_network::{
    Column as PublicNetworkColumn, Entity as PublicNetworkEntity, PublicNetworkResponse,
};

pub struct LabService {
    state: AppState,
}

impl LabService {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// 实验室列表
    pub async fn list_labs(&self) -> anyhow::Result<LabListResponse> {
        let labs = LabEntity::find()
            .order_by_asc(LabColumn::Name)
            .all(&self.state.sea_db())
            .await?;

        let total = labs.len();
        Ok(LabListResponse {
            labs: labs.into_iter().map(LabResponse::from).collect(),
            total,
        })
    }

    /// 按名字查实验室
    pub async fn get_lab_by_name(&self, name: &str) -> anyhow::Result<LabModel> {
        LabEntity::find()
            .filter(LabColumn::Name.eq(name))
            .one(&self.state.sea_db())
            .await?
            .ok_or_else(|| anyhow::anyhow!("实验室不存在: {}", name))
    }

    /// 按名字查实验室并校验 Agent 令牌
    pub async fn authenticate_lab(&self, name: &str, token: &str) -> anyhow::Result<LabModel> {
        let lab = self.get_lab_by_name(name).await?;
        if lab.api_token != token {
            return Err(anyhow::anyhow!("实验室令牌不匹配"));
        }
        Ok(lab)
    }

    /// 更新实验室状态（Agent 上报）
    pub async fn update_status(&self, name: &str, status: LabStatus) -> anyhow::Result<LabResponse> {
        let lab = self.get_lab_by_name(name).await?;

        let mut active: LabActiveModel = lab.into();
        active.status = Set(status.as_str().to_string());
        active.updated_at = Set(Utc::now().into());
        let updated = active.update(&self.state.sea_db()).await?;

        info!("实验室 {} 状态更新为 {}", name, status.as_str());
        Ok(LabResponse::from(updated))
    }

    /// 实验室的主机清单
    pub async fn list_hosts(&self, lab_id: &str) -> anyhow::Result<HostListResponse> {
        let hosts = HostEntity::find()
            .filter(HostColumn::LabId.eq(lab_id))
            .order_by_asc(HostColumn::Name)
            .all(&self.state.sea_db())
            .await?;

        let total = hosts.len();
        Ok(HostListResponse {
            hosts: hosts.into_iter().map(HostResponse::from).collect(),
            total,
        })
    }

    /// 实验室的主机规格清单
    pub async fn list_profiles(&self, lab_id: &str) -> anyhow::Result<Vec<HostProfileResponse>> {
        let profiles = ProfileEntity::find()
            .filter(ProfileColumn::LabId.eq(lab_id))
            .order_by_asc(ProfileColumn::Name)
            .all(&self.state.sea_db())
            .await?;

        Ok(profiles.into_iter().map(HostProfileResponse::from).collect())
    }

    /// 实验室的公网 VLAN 清单
    pub async fn list_public_networks(
        &self,
        lab_id: &str,
    ) -> anyhow::Result<Vec<PublicNetworkResponse>> {
        let networks = PublicNetworkEntity::find()
            .filter(PublicNetworkColumn::LabId.eq(lab_id))
            .order_by_asc(PublicNetworkColumn::Vlan)
            .all(&self.state.sea_db())
            .await?;

        Ok(networks.into_iter().map(PublicNetworkResponse::from).collect())
    }

    /// 主机的网卡清单
    pub async fn list_interfaces(&self, host_id: &str) -> anyhow::Result<Vec<InterfaceResponse>> {
        let interfaces = InterfaceEntity::find()
            .filter(InterfaceColumn::HostId.eq(host_id))
            .order_by_asc(InterfaceColumn::Name)
            .all(&self.state.sea_db())
            .await?;

        Ok(interfaces.into_iter().map(InterfaceResponse::from).collect())
    }
}
