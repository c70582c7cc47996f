/// 资源管理服务
///
/// 负责模板 -> 资源包的实例化: 分配 VLAN、占用物理主机、写入网卡配置，
/// 以及预约结束后的整体释放。实例化的所有写入都发生在调用方的事务里，
/// 中途失败由事务回滚统一撤销。

use std::collections::{BTreeMap, HashSet};

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use serde_json::Value as JsonValue;
use tracing::{info, warn};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::db::models::booking::{Column as BookingColumn, Entity as BookingEntity};
use crate::db::models::host::{
    ActiveModel as HostActiveModel, Column as HostColumn, Entity as HostEntity,
    Model as HostModel,
};
use crate::db::models::interface::{
    ActiveModel as InterfaceActiveModel, Column as InterfaceColumn, Entity as InterfaceEntity,
    VlanConfigEntry,
};
use crate::db::models::resource_bundle::{
    ActiveModel as BundleActiveModel, Entity as BundleEntity, Model as BundleModel,
};
use crate::db::models::resource_template::{
    ActiveModel as TemplateActiveModel, Column as TemplateColumn, CreateTemplateDto,
    Entity as TemplateEntity, Model as TemplateModel, TemplateHostConfig, TemplateListResponse,
    TemplateNetwork, TemplateResponse,
};
use crate::services::vlan_service::VlanService;

pub struct ResourceService {
    state: AppState,
}

impl ResourceService {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// 把模板实例化为资源包
    ///
    /// 必须在事务内调用: 分配 VLAN、逐台占用主机、配置网卡，
    /// 任何一步失败都由调用方回滚
    pub async fn instantiate_template<C: ConnectionTrait>(
        &self,
        db: &C,
        template: &TemplateModel,
    ) -> anyhow::Result<BundleModel> {
        let host_configs = parse_host_configs(&template.host_configs)?;
        let networks = parse_networks(&template.networks)?;

        if host_configs.is_empty() {
            return Err(anyhow::anyhow!("模板 {} 不包含任何主机", template.id));
        }

        let vlan_service = VlanService::new(self.state.clone());

        // 先分配网络，再占用主机
        let private_nets: Vec<&TemplateNetwork> =
            networks.iter().filter(|n| !n.public).collect();
        let private_ids = vlan_service
            .allocate_vlans(db, &template.lab_id, private_nets.len())
            .await?;

        let mut vlan_map: BTreeMap<String, i32> = BTreeMap::new();
        for (net, id) in private_nets.iter().zip(private_ids.iter()) {
            vlan_map.insert(net.name.clone(), *id);
        }

        for net in networks.iter().filter(|n| n.public) {
            let public = vlan_service
                .allocate_public_vlan(db, &template.lab_id)
                .await?;
            vlan_map.insert(net.name.clone(), public.vlan);
        }

        let public_names: HashSet<String> = networks
            .iter()
            .filter(|n| n.public)
            .map(|n| n.name.clone())
            .collect();

        // 创建资源包
        let bundle_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let bundle_active = BundleActiveModel {
            id: Set(bundle_id.clone()),
            template_id: Set(template.id.clone()),
            vlans: Set(serde_json::to_value(&vlan_map)?),
            assignments: Set(JsonValue::Object(Default::default())),
            created_at: Set(now.into()),
        };
        let bundle = bundle_active.insert(db).await?;

        // 逐台占用主机并写网卡配置，记录主机与模板配置的对应关系
        let mut assignments = serde_json::Map::new();
        for config in &host_configs {
            let host = self
                .acquire_host(db, &template.lab_id, &config.profile_id, &bundle_id)
                .await?;

            self.configure_networking(db, &host, config, &vlan_map, &public_names)
                .await?;

            assignments.insert(
                host.id.clone(),
                serde_json::json!({
                    "hostname": config.hostname,
                    "image": config.image,
                }),
            );
        }

        let mut bundle_active: BundleActiveModel = bundle.into();
        bundle_active.assignments = Set(JsonValue::Object(assignments));
        let bundle = bundle_active.update(db).await?;

        info!(
            "模板 {} 实例化为资源包 {} ({} 台主机, {} 个网络)",
            template.id,
            bundle.id,
            host_configs.len(),
            vlan_map.len()
        );
        Ok(bundle)
    }

    /// 占用一台符合规格的空闲主机
    ///
    /// 按主机名顺序取第一台未被占用且硬件可用的机器，行级锁防止并发抢占
    async fn acquire_host<C: ConnectionTrait>(
        &self,
        db: &C,
        lab_id: &str,
        profile_id: &str,
        bundle_id: &str,
    ) -> anyhow::Result<HostModel> {
        let host = HostEntity::find()
            .filter(HostColumn::LabId.eq(lab_id))
            .filter(HostColumn::ProfileId.eq(profile_id))
            .filter(HostColumn::Booked.eq(false))
            .filter(HostColumn::Working.eq(true))
            .order_by_asc(HostColumn::Name)
            .lock_exclusive()
            .one(db)
            .await?
            .ok_or_else(|| {
                anyhow::anyhow!("实验室 {} 没有规格为 {} 的空闲主机", lab_id, profile_id)
            })?;

        let mut active: HostActiveModel = host.clone().into();
        active.booked = Set(true);
        active.bundle_id = Set(Some(bundle_id.to_string()));
        active.updated_at = Set(Utc::now().into());
        let updated = active.update(db).await?;

        info!("主机 {} 已占用 (资源包 {})", updated.name, bundle_id);
        Ok(updated)
    }

    /// 按模板的接线定义写入主机网卡的 VLAN 配置
    async fn configure_networking<C: ConnectionTrait>(
        &self,
        db: &C,
        host: &HostModel,
        config: &TemplateHostConfig,
        vlan_map: &BTreeMap<String, i32>,
        public_names: &HashSet<String>,
    ) -> anyhow::Result<()> {
        for (iface_name, nets) in &config.interfaces {
            let iface = InterfaceEntity::find()
                .filter(InterfaceColumn::HostId.eq(host.id.clone()))
                .filter(InterfaceColumn::Name.eq(iface_name.clone()))
                .one(db)
                .await?
                .ok_or_else(|| {
                    anyhow::anyhow!("主机 {} 没有名为 {} 的网卡", host.name, iface_name)
                })?;

            let entries = build_interface_config(nets, vlan_map, public_names)?;

            let mut active: InterfaceActiveModel = iface.into();
            active.config = Set(serde_json::to_value(&entries)?);
            active.updated_at = Set(Utc::now().into());
            active.update(db).await?;
        }

        Ok(())
    }

    /// 释放资源包: 归还主机、清空网卡配置、归还 VLAN，最后删除资源包
    pub async fn release_bundle<C: ConnectionTrait>(
        &self,
        db: &C,
        bundle_id: &str,
    ) -> anyhow::Result<()> {
        let bundle = match BundleEntity::find_by_id(bundle_id).one(db).await? {
            Some(bundle) => bundle,
            None => {
                warn!("资源包 {} 不存在，跳过释放", bundle_id);
                return Ok(());
            }
        };

        let template = TemplateEntity::find_by_id(bundle.template_id.clone())
            .one(db)
            .await?
            .ok_or_else(|| anyhow::anyhow!("资源包 {} 的模板不存在", bundle_id))?;
        let networks = parse_networks(&template.networks)?;

        // 归还主机
        let hosts = HostEntity::find()
            .filter(HostColumn::BundleId.eq(bundle_id))
            .all(db)
            .await?;

        for host in hosts {
            let host_id = host.id.clone();

            let mut active: HostActiveModel = host.into();
            active.booked = Set(false);
            active.bundle_id = Set(None);
            active.updated_at = Set(Utc::now().into());
            active.update(db).await?;

            // 清空该主机所有网卡配置
            let interfaces = InterfaceEntity::find()
                .filter(InterfaceColumn::HostId.eq(host_id))
                .all(db)
                .await?;
            for iface in interfaces {
                let mut active: InterfaceActiveModel = iface.into();
                active.config = Set(JsonValue::Array(vec![]));
                active.updated_at = Set(Utc::now().into());
                active.update(db).await?;
            }
        }

        // 归还 VLAN
        let vlan_map: BTreeMap<String, i32> = serde_json::from_value(bundle.vlans.clone())?;
        let public_names: HashSet<&str> = networks
            .iter()
            .filter(|n| n.public)
            .map(|n| n.name.as_str())
            .collect();

        let vlan_service = VlanService::new(self.state.clone());
        let mut private_ids = Vec::new();
        for (name, id) in &vlan_map {
            if public_names.contains(name.as_str()) {
                vlan_service
                    .release_public_vlan(db, &template.lab_id, *id)
                    .await?;
            } else {
                private_ids.push(*id);
            }
        }
        if !private_ids.is_empty() {
            vlan_service
                .release_vlans(db, &template.lab_id, &private_ids)
                .await?;
        }

        BundleEntity::delete_by_id(bundle_id).exec(db).await?;

        info!("资源包 {} 已释放", bundle_id);
        Ok(())
    }

    /// 模板当前是否有足够资源可实例化
    ///
    /// 只做计数检查，不做任何预留；实例化事务本身才是最终裁决
    pub async fn template_is_reservable(&self, template: &TemplateModel) -> anyhow::Result<bool> {
        let db = &self.state.sea_db();

        let host_configs = parse_host_configs(&template.host_configs)?;
        let networks = parse_networks(&template.networks)?;

        // 每种规格需要的数量
        let mut needed: BTreeMap<&str, u64> = BTreeMap::new();
        for config in &host_configs {
            *needed.entry(config.profile_id.as_str()).or_insert(0) += 1;
        }

        for (profile_id, count) in needed {
            let free = HostEntity::find()
                .filter(HostColumn::LabId.eq(template.lab_id.clone()))
                .filter(HostColumn::ProfileId.eq(profile_id))
                .filter(HostColumn::Booked.eq(false))
                .filter(HostColumn::Working.eq(true))
                .count(db)
                .await?;
            if free < count {
                return Ok(false);
            }
        }

        let vlan_service = VlanService::new(self.state.clone());
        let private_needed = networks.iter().filter(|n| !n.public).count();
        if private_needed > 0 {
            let available = vlan_service.available_count(&template.lab_id).await?;
            if available < private_needed {
                return Ok(false);
            }
        }

        let public_needed = networks.iter().filter(|n| n.public).count() as u64;
        if public_needed > 0 {
            use crate::db::models::public_network::{
                Column as PublicNetworkColumn, Entity as PublicNetworkEntity,
            };
            let free = PublicNetworkEntity::find()
                .filter(PublicNetworkColumn::LabId.eq(template.lab_id.clone()))
                .filter(PublicNetworkColumn::InUse.eq(false))
                .count(db)
                .await?;
            if free < public_needed {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// 创建资源模板
    pub async fn create_template(
        &self,
        owner_id: &str,
        dto: CreateTemplateDto,
    ) -> anyhow::Result<TemplateResponse> {
        for config in &dto.host_configs {
            if !common::utils::is_valid_hostname(&config.hostname) {
                return Err(anyhow::anyhow!("非法主机名: {}", config.hostname));
            }
        }

        let now = Utc::now();
        let template_active = TemplateActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            owner_id: Set(owner_id.to_string()),
            lab_id: Set(dto.lab_id),
            name: Set(dto.name),
            description: Set(dto.description),
            public: Set(dto.public),
            hidden: Set(false),
            host_configs: Set(serde_json::to_value(&dto.host_configs)?),
            networks: Set(serde_json::to_value(&dto.networks)?),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        let template = template_active.insert(&self.state.sea_db()).await?;
        info!("用户 {} 创建模板 {}", owner_id, template.id);
        Ok(TemplateResponse::from(template))
    }

    /// 列出用户可见的模板（公共模板 + 自己的模板，隐藏的除外）
    pub async fn list_templates(&self, user_id: &str) -> anyhow::Result<TemplateListResponse> {
        let db = &self.state.sea_db();

        let templates = TemplateEntity::find()
            .filter(TemplateColumn::Hidden.eq(false))
            .filter(
                TemplateColumn::Public
                    .eq(true)
                    .or(TemplateColumn::OwnerId.eq(user_id)),
            )
            .order_by_desc(TemplateColumn::CreatedAt)
            .all(db)
            .await?;

        let total = templates.len();
        Ok(TemplateListResponse {
            templates: templates.into_iter().map(TemplateResponse::from).collect(),
            total,
        })
    }

    /// 获取单个模板
    pub async fn get_template(&self, template_id: &str) -> anyhow::Result<TemplateModel> {
        TemplateEntity::find_by_id(template_id)
            .one(&self.state.sea_db())
            .await?
            .ok_or_else(|| anyhow::anyhow!("模板不存在: {}", template_id))
    }

    /// 删除模板；被预约引用过的模板改为隐藏
    pub async fn delete_template(&self, user_id: &str, template_id: &str) -> anyhow::Result<()> {
        let db = &self.state.sea_db();

        let template = TemplateEntity::find_by_id(template_id)
            .one(db)
            .await?
            .ok_or_else(|| anyhow::anyhow!("模板不存在: {}", template_id))?;

        if template.owner_id != user_id {
            return Err(anyhow::anyhow!("只有模板所有者可以删除模板"));
        }

        let referenced = BookingEntity::find()
            .filter(BookingColumn::TemplateId.eq(template_id))
            .count(db)
            .await?;

        if referenced > 0 {
            let mut active: TemplateActiveModel = template.into();
            active.hidden = Set(true);
            active.updated_at = Set(Utc::now().into());
            active.update(db).await?;
            info!("模板 {} 被预约引用，已改为隐藏", template_id);
        } else {
            TemplateEntity::delete_by_id(template_id).exec(db).await?;
            info!("模板 {} 已删除", template_id);
        }

        Ok(())
    }
}

impl ResourceService {
    /// 资源包详情（含占用的主机）
    pub async fn get_bundle(
        &self,
        bundle_id: &str,
    ) -> anyhow::Result<crate::db::models::resource_bundle::BundleResponse> {
        let db = self.state.sea_db();

        let bundle = BundleEntity::find_by_id(bundle_id)
            .one(&db)
            .await?
            .ok_or_else(|| anyhow::anyhow!("资源包不存在: {}", bundle_id))?;

        let hosts = HostEntity::find()
            .filter(HostColumn::BundleId.eq(bundle_id))
            .order_by_asc(HostColumn::Name)
            .all(&db)
            .await?;

        Ok(crate::db::models::resource_bundle::BundleResponse {
            id: bundle.id,
            template_id: bundle.template_id,
            vlans: bundle.vlans,
            hosts: hosts
                .into_iter()
                .map(crate::db::models::host::HostResponse::from)
                .collect(),
        })
    }

    /// 为资源包里的一台主机生成 cloud-init 用户数据
    ///
    /// 授权公钥取预约所有者与全部协作者的 SSH 公钥，
    /// 主机名取实例化时记录的部署主机名
    pub async fn ci_userdata(&self, resource_id: &str, host_id: &str) -> anyhow::Result<String> {
        use crate::db::models::user::Entity as UserEntity;

        let db = self.state.sea_db();

        let bundle = BundleEntity::find_by_id(resource_id)
            .one(&db)
            .await?
            .ok_or_else(|| anyhow::anyhow!("资源包不存在: {}", resource_id))?;

        let booking = BookingEntity::find()
            .filter(BookingColumn::ResourceId.eq(resource_id))
            .one(&db)
            .await?
            .ok_or_else(|| anyhow::anyhow!("资源包 {} 没有关联预约", resource_id))?;

        let hostname = bundle
            .assignments
            .get(host_id)
            .and_then(|a| a.get("hostname"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("主机 {} 不属于资源包 {}", host_id, resource_id))?;

        let mut user_ids = vec![booking.owner_id.clone()];
        if let Some(list) = booking.collaborators.as_array() {
            user_ids.extend(
                list.iter()
                    .filter_map(|v| v.as_str())
                    .map(|s| s.to_string()),
            );
        }

        let mut ssh_keys = Vec::new();
        for user_id in user_ids {
            if let Some(user) = UserEntity::find_by_id(user_id).one(&db).await? {
                if let Some(keys) = user.ssh_public_keys.as_array() {
                    ssh_keys.extend(
                        keys.iter()
                            .filter_map(|k| k.as_str())
                            .map(|k| k.to_string()),
                    );
                }
            }
        }

        crate::cloud_init::render_userdata(&hostname, &ssh_keys)
    }
}

pub fn parse_host_configs(value: &JsonValue) -> anyhow::Result<Vec<TemplateHostConfig>> {
    Ok(serde_json::from_value(value.clone())?)
}

pub fn parse_networks(value: &JsonValue) -> anyhow::Result<Vec<TemplateNetwork>> {
    Ok(serde_json::from_value(value.clone())?)
}

/// 按接线顺序生成网卡的 VLAN 配置: 第一个网络 untagged，其余 tagged
pub fn build_interface_config(
    nets: &[String],
    vlan_map: &BTreeMap<String, i32>,
    public_names: &HashSet<String>,
) -> anyhow::Result<Vec<VlanConfigEntry>> {
    let mut entries = Vec::with_capacity(nets.len());

    for (index, net) in nets.iter().enumerate() {
        let vlan_id = *vlan_map
            .get(net)
            .ok_or_else(|| anyhow::anyhow!("网络 {} 未分配 VLAN", net))?;
        entries.push(VlanConfigEntry {
            vlan_id,
            tagged: index > 0,
            public: public_names.contains(net),
            network: net.clone(),
        });
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vlan_map() -> BTreeMap<String, i32> {
        BTreeMap::from([
            ("admin".to_string(), 101),
            ("data".to_string(), 102),
            ("ext".to_string(), 300),
        ])
    }

    #[test]
    fn test_build_interface_config_tagging() {
        let public: HashSet<String> = HashSet::from(["ext".to_string()]);
        let nets = vec!["admin".to_string(), "data".to_string(), "ext".to_string()];

        let entries = build_interface_config(&nets, &vlan_map(), &public).unwrap();
        assert_eq!(entries.len(), 3);

        // 第一个网络 untagged，其余 tagged
        assert!(!entries[0].tagged);
        assert!(entries[1].tagged);
        assert!(entries[2].tagged);

        assert_eq!(entries[0].vlan_id, 101);
        assert!(!entries[0].public);
        assert!(entries[2].public);
    }

    #[test]
    fn test_build_interface_config_unknown_network() {
        let public = HashSet::new();
        let nets = vec!["missing".to_string()];
        assert!(build_interface_config(&nets, &vlan_map(), &public).is_err());
    }

    #[test]
    fn test_parse_host_configs() {
        let value = serde_json::json!([
            {
                "profile_id": "p1",
                "hostname": "node1",
                "image": "ubuntu-2204",
                "interfaces": {"eno1": ["admin"]}
            }
        ]);
        let configs = parse_host_configs(&value).unwrap();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].hostname, "node1");
        assert_eq!(configs[0].interfaces["eno1"], vec!["admin".to_string()]);
    }
}
