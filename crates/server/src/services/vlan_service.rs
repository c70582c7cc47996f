/// VLAN 分配服务
///
/// 私有 VLAN 来自每个实验室固定 4096 项的位数组池，
/// 公网 VLAN 为逐条登记的 public_networks 行。
/// 所有读改写都在事务内持有行级排它锁，避免并发预约重复分配。

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde_json::Value as JsonValue;
use tracing::info;

use common::errors::{Error, Result};

use crate::app_state::AppState;
use crate::db::models::public_network::{
    ActiveModel as PublicNetworkActiveModel, Column as PublicNetworkColumn,
    Entity as PublicNetworkEntity, Model as PublicNetworkModel,
};
use crate::db::models::vlan_manager::{
    ActiveModel as VlanManagerActiveModel, Column as VlanManagerColumn,
    Entity as VlanManagerEntity, Model as VlanManagerModel,
};

/// 每个实验室的 VLAN id 空间
pub const VLAN_POOL_SIZE: usize = 4096;

/// VLAN 位数组池
///
/// vlans[i] == 1 表示可分配，reserved[i] == 1 表示已预留；
/// 除非允许重叠，否则 id 可用的条件为 vlans[i] == 1 且 reserved[i] == 0
#[derive(Debug, Clone)]
pub struct VlanPool {
    vlans: Vec<u8>,
    reserved: Vec<u8>,
    allow_overlapping: bool,
}

impl VlanPool {
    /// 全部可用的新池
    pub fn new(allow_overlapping: bool) -> Self {
        Self {
            vlans: vec![1; VLAN_POOL_SIZE],
            reserved: vec![0; VLAN_POOL_SIZE],
            allow_overlapping,
        }
    }

    /// 从数据库 JSON 列恢复
    pub fn from_json(
        vlans: &JsonValue,
        reserved: &JsonValue,
        allow_overlapping: bool,
    ) -> Result<Self> {
        let vlans = decode_bit_array(vlans)?;
        let reserved = decode_bit_array(reserved)?;
        Ok(Self {
            vlans,
            reserved,
            allow_overlapping,
        })
    }

    /// 序列化为数据库 JSON 列
    pub fn to_json(&self) -> (JsonValue, JsonValue) {
        (
            JsonValue::from(self.vlans.clone()),
            JsonValue::from(self.reserved.clone()),
        )
    }

    pub fn is_available(&self, id: usize) -> bool {
        id < VLAN_POOL_SIZE
            && self.vlans[id] == 1
            && (self.reserved[id] == 0 || self.allow_overlapping)
    }

    pub fn available_count(&self) -> usize {
        (0..VLAN_POOL_SIZE).filter(|&i| self.is_available(i)).count()
    }

    /// 分配 count 个 VLAN id
    ///
    /// 从低位向高位扫描，分配即置 0。可用数量不足时整体回退并报错
    pub fn get_vlans(&mut self, count: usize) -> Result<Vec<i32>> {
        let mut taken = Vec::with_capacity(count);

        for id in 0..VLAN_POOL_SIZE {
            if taken.len() == count {
                break;
            }
            if self.is_available(id) {
                self.vlans[id] = 0;
                taken.push(id as i32);
            }
        }

        if taken.len() < count {
            // 回退已扫到的部分
            for id in &taken {
                self.vlans[*id as usize] = 1;
            }
            return Err(Error::ResourceUnavailable(format!(
                "VLAN 池可用数量不足: 需要 {}, 实际 {}",
                count,
                taken.len()
            )));
        }

        Ok(taken)
    }

    /// 预留一组 VLAN id，任何一个已被预留则整体失败
    pub fn reserve_vlans(&mut self, ids: &[i32]) -> Result<()> {
        for &id in ids {
            let idx = usize::try_from(id)
                .ok()
                .filter(|&i| i < VLAN_POOL_SIZE)
                .ok_or_else(|| Error::InvalidArgument(format!("VLAN id 越界: {}", id)))?;
            if self.reserved[idx] == 1 {
                return Err(Error::InvalidArgument(format!("VLAN {} 已被预留", id)));
            }
        }

        for &id in ids {
            self.reserved[id as usize] = 1;
        }
        Ok(())
    }

    /// 释放一组 VLAN id 回池
    pub fn release_vlans(&mut self, ids: &[i32]) {
        for &id in ids {
            if let Ok(idx) = usize::try_from(id) {
                if idx < VLAN_POOL_SIZE {
                    self.vlans[idx] = 1;
                }
            }
        }
    }
}

fn decode_bit_array(value: &JsonValue) -> Result<Vec<u8>> {
    let entries = value
        .as_array()
        .ok_or_else(|| Error::Database("VLAN 位数组不是 JSON 数组".to_string()))?;

    if entries.len() != VLAN_POOL_SIZE {
        return Err(Error::Database(format!(
            "VLAN 位数组长度错误: {}",
            entries.len()
        )));
    }

    entries
        .iter()
        .map(|v| match v.as_u64() {
            Some(0) => Ok(0u8),
            Some(1) => Ok(1u8),
            _ => Err(Error::Database(format!("VLAN 位数组包含非 0/1 项: {}", v))),
        })
        .collect()
}

pub struct VlanService {
    state: AppState,
}

impl VlanService {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// 加锁读取实验室的 VLAN 池行
    ///
    /// 必须在事务连接上调用，锁随事务提交或回滚释放
    async fn load_locked<C: ConnectionTrait>(
        &self,
        db: &C,
        lab_id: &str,
    ) -> anyhow::Result<(VlanManagerModel, VlanPool)> {
        let row = VlanManagerEntity::find()
            .filter(VlanManagerColumn::LabId.eq(lab_id))
            .lock_exclusive()
            .one(db)
            .await?
            .ok_or_else(|| anyhow::anyhow!("实验室 {} 没有 VLAN 池", lab_id))?;

        let pool = VlanPool::from_json(&row.vlans, &row.reserved_vlans, row.allow_overlapping)?;
        Ok((row, pool))
    }

    async fn store<C: ConnectionTrait>(
        &self,
        db: &C,
        row: VlanManagerModel,
        pool: &VlanPool,
    ) -> anyhow::Result<()> {
        let (vlans, reserved) = pool.to_json();
        let mut active: VlanManagerActiveModel = row.into();
        active.vlans = Set(vlans);
        active.reserved_vlans = Set(reserved);
        active.updated_at = Set(Utc::now().into());
        active.update(db).await?;
        Ok(())
    }

    /// 实验室首次接入时建池（已存在则不动）
    pub async fn ensure_pool<C: ConnectionTrait>(
        &self,
        db: &C,
        lab_id: &str,
        allow_overlapping: bool,
    ) -> anyhow::Result<()> {
        let existing = VlanManagerEntity::find()
            .filter(VlanManagerColumn::LabId.eq(lab_id))
            .one(db)
            .await?;
        if existing.is_some() {
            return Ok(());
        }

        let pool = VlanPool::new(allow_overlapping);
        let (vlans, reserved) = pool.to_json();
        let active = VlanManagerActiveModel {
            id: Set(common::utils::generate_id()),
            lab_id: Set(lab_id.to_string()),
            vlans: Set(vlans),
            reserved_vlans: Set(reserved),
            block_size: Set(20),
            allow_overlapping: Set(allow_overlapping),
            updated_at: Set(Utc::now().into()),
        };
        active.insert(db).await?;

        info!("实验室 {} 的 VLAN 池已初始化", lab_id);
        Ok(())
    }

    /// 分配 count 个私有 VLAN
    pub async fn allocate_vlans<C: ConnectionTrait>(
        &self,
        db: &C,
        lab_id: &str,
        count: usize,
    ) -> anyhow::Result<Vec<i32>> {
        let (row, mut pool) = self.load_locked(db, lab_id).await?;
        let ids = pool.get_vlans(count)?;
        self.store(db, row, &pool).await?;

        info!("实验室 {} 分配了 {} 个 VLAN: {:?}", lab_id, count, ids);
        Ok(ids)
    }

    /// 预留一组私有 VLAN
    pub async fn reserve_vlans<C: ConnectionTrait>(
        &self,
        db: &C,
        lab_id: &str,
        ids: &[i32],
    ) -> anyhow::Result<()> {
        let (row, mut pool) = self.load_locked(db, lab_id).await?;
        pool.reserve_vlans(ids)?;
        self.store(db, row, &pool).await?;
        Ok(())
    }

    /// 释放一组私有 VLAN 回池
    pub async fn release_vlans<C: ConnectionTrait>(
        &self,
        db: &C,
        lab_id: &str,
        ids: &[i32],
    ) -> anyhow::Result<()> {
        let (row, mut pool) = self.load_locked(db, lab_id).await?;
        pool.release_vlans(ids);
        self.store(db, row, &pool).await?;

        info!("实验室 {} 释放了 VLAN: {:?}", lab_id, ids);
        Ok(())
    }

    /// 实验室当前可分配的私有 VLAN 数量
    pub async fn available_count(&self, lab_id: &str) -> anyhow::Result<usize> {
        let row = VlanManagerEntity::find()
            .filter(VlanManagerColumn::LabId.eq(lab_id))
            .one(&self.state.sea_db())
            .await?
            .ok_or_else(|| anyhow::anyhow!("实验室 {} 没有 VLAN 池", lab_id))?;

        let pool = VlanPool::from_json(&row.vlans, &row.reserved_vlans, row.allow_overlapping)?;
        Ok(pool.available_count())
    }

    /// 占用一个公网 VLAN
    pub async fn allocate_public_vlan<C: ConnectionTrait>(
        &self,
        db: &C,
        lab_id: &str,
    ) -> anyhow::Result<PublicNetworkModel> {
        let row = PublicNetworkEntity::find()
            .filter(PublicNetworkColumn::LabId.eq(lab_id))
            .filter(PublicNetworkColumn::InUse.eq(false))
            .order_by_asc(PublicNetworkColumn::Vlan)
            .lock_exclusive()
            .one(db)
            .await?
            .ok_or_else(|| anyhow::anyhow!("实验室 {} 没有空闲的公网 VLAN", lab_id))?;

        let vlan = row.vlan;
        let mut active: PublicNetworkActiveModel = row.into();
        active.in_use = Set(true);
        let updated = active.update(db).await?;

        info!("实验室 {} 占用公网 VLAN {}", lab_id, vlan);
        Ok(updated)
    }

    /// 释放一个公网 VLAN
    pub async fn release_public_vlan<C: ConnectionTrait>(
        &self,
        db: &C,
        lab_id: &str,
        vlan: i32,
    ) -> anyhow::Result<()> {
        let row = PublicNetworkEntity::find()
            .filter(PublicNetworkColumn::LabId.eq(lab_id))
            .filter(PublicNetworkColumn::Vlan.eq(vlan))
            .lock_exclusive()
            .one(db)
            .await?
            .ok_or_else(|| anyhow::anyhow!("公网 VLAN {} 不存在", vlan))?;

        let mut active: PublicNetworkActiveModel = row.into();
        active.in_use = Set(false);
        active.update(db).await?;

        info!("实验室 {} 释放公网 VLAN {}", lab_id, vlan);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_vlans_marks_taken() {
        let mut pool = VlanPool::new(false);
        let ids = pool.get_vlans(3).unwrap();
        assert_eq!(ids, vec![0, 1, 2]);
        assert!(!pool.is_available(0));
        assert!(!pool.is_available(2));
        assert!(pool.is_available(3));
        assert_eq!(pool.available_count(), VLAN_POOL_SIZE - 3);
    }

    #[test]
    fn test_get_vlans_skips_reserved() {
        let mut pool = VlanPool::new(false);
        pool.reserve_vlans(&[0, 1]).unwrap();
        let ids = pool.get_vlans(2).unwrap();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn test_get_vlans_overlapping_ignores_reserved() {
        let mut pool = VlanPool::new(true);
        pool.reserve_vlans(&[0, 1]).unwrap();
        let ids = pool.get_vlans(2).unwrap();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn test_get_vlans_exhaustion_rolls_back() {
        let mut pool = VlanPool::new(false);
        let before = pool.available_count();
        assert!(pool.get_vlans(VLAN_POOL_SIZE + 1).is_err());
        // 失败时不应留下半分配状态
        assert_eq!(pool.available_count(), before);
    }

    #[test]
    fn test_reserve_vlans_rejects_double_reserve() {
        let mut pool = VlanPool::new(false);
        pool.reserve_vlans(&[100]).unwrap();
        assert!(pool.reserve_vlans(&[100]).is_err());
        assert!(pool.reserve_vlans(&[5000]).is_err());
    }

    #[test]
    fn test_release_returns_to_pool() {
        let mut pool = VlanPool::new(false);
        let ids = pool.get_vlans(2).unwrap();
        pool.release_vlans(&ids);
        assert!(pool.is_available(0));
        assert!(pool.is_available(1));
        assert_eq!(pool.available_count(), VLAN_POOL_SIZE);
    }

    #[test]
    fn test_json_round_trip() {
        let mut pool = VlanPool::new(false);
        pool.get_vlans(5).unwrap();
        pool.reserve_vlans(&[10, 11]).unwrap();

        let (vlans, reserved) = pool.to_json();
        let restored = VlanPool::from_json(&vlans, &reserved, false).unwrap();
        assert_eq!(restored.available_count(), pool.available_count());
        assert!(!restored.is_available(10));
    }

    #[test]
    fn test_from_json_rejects_bad_input() {
        let short = JsonValue::from(vec![1u8; 10]);
        let ok = JsonValue::from(vec![0u8; VLAN_POOL_SIZE]);
        assert!(VlanPool::from_json(&short, &ok, false).is_err());

        let bad = JsonValue::from(vec![7u8; VLAN_POOL_SIZE]);
        assert!(VlanPool::from_json(&bad, &ok, false).is_err());
    }
}
