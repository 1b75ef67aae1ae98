//! # ParticipantRegistry：在线参与者的唯一事实来源
//!
//! ## 核心意图（Why）
//! - 维护 `ParticipantId -> ParticipantEntry` 映射，回答“此刻谁可达”；
//! - 流式会话、数据报网关与任意路由调用方并发访问，需要一个注册表级的临界区，
//!   同时保证临界区内 **绝不** 执行网络 I/O，避免一个慢速/失效的对端拖住所有注册与查询。
//!
//! ## 架构定位（Where）
//! - 由 [`Relay`](crate::Relay) 以 `Arc` 持有，注入到 TCP 接入器、UDP 网关与路由引擎；
//! - 路由引擎只读（`snapshot`/`lookup`），注册与注销只由拥有该参与者的会话或网关发起。
//!
//! ## 行为契约（What）
//! - `register`：插入或替换（后写者胜），被替换的条目移到顺序末尾；
//! - `remove`：删除条目，不存在时为空操作；
//! - `snapshot`：按注册顺序返回一致的时间点拷贝（copy-on-read），调用方迭代时不持锁；
//! - `lookup`：按身份返回条目拷贝；
//! - 所有操作互斥，复杂度为 O(1) 或 O(n)。
//!
//! ## 风险提示（Trade-offs）
//! - 单把 `parking_lot::Mutex` 串行化所有访问；条目数量很大时快照拷贝为 O(n)，
//!   但换来了“快照从不观察到并发修改”的强保证；
//! - 数据报参与者没有关闭信号，条目只增不减，直到进程重启。

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
    channel::DeliveryChannel,
    participant::{ParticipantEntry, ParticipantId, ParticipantSummary, TransportKind},
};

#[derive(Debug)]
struct Slot {
    seq: u64,
    entry: ParticipantEntry,
}

#[derive(Debug, Default)]
struct RegistryInner {
    entries: HashMap<ParticipantId, Slot>,
    order: BTreeMap<u64, ParticipantId>,
    next_seq: u64,
}

/// 线程安全的参与者注册表。
///
/// # 教案式注释
/// - **意图 (Why)**：封装映射与顺序索引，避免上层直接操作容器或在持锁期间做 I/O；
/// - **逻辑 (How)**：`entries` 保存条目与其注册序号，`order` 以序号为键维护插入顺序，
///   快照按 `order` 迭代即得到注册顺序；
/// - **契约 (What)**：同一身份任意时刻至多一个条目；存在的身份必然持有有效通道。
#[derive(Debug, Default)]
pub struct ParticipantRegistry {
    inner: Mutex<RegistryInner>,
}

impl ParticipantRegistry {
    /// 创建空注册表。
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册或替换参与者。
    ///
    /// # 教案式注释
    /// - **意图 (Why)**：同一身份重新接入时以最新通道为准（后写者胜）；
    /// - **契约 (What)**：
    ///   - 返回被替换的旧条目，便于调用方感知“重复注册”；
    ///   - **后置条件**：新条目存活标记为 `true`，位于快照顺序末尾。
    pub fn register(
        &self,
        id: ParticipantId,
        channel: Arc<dyn DeliveryChannel>,
        transport: TransportKind,
    ) -> Option<ParticipantEntry> {
        let entry = ParticipantEntry::new(id.clone(), transport, channel);
        let mut inner = self.inner.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        let previous = inner.entries.insert(id.clone(), Slot { seq, entry });
        if let Some(old) = &previous {
            inner.order.remove(&old.seq);
        }
        inner.order.insert(seq, id);
        previous.map(|slot| slot.entry)
    }

    /// 仅当身份尚未注册时插入，返回是否发生了插入。
    ///
    /// - **意图 (Why)**：数据报网关“首次见到即注册”，判断与插入必须在同一临界区内完成；
    /// - **契约 (What)**：`make_channel` 只在真正插入时调用，且在锁内执行，因此必须是纯构造、无 I/O。
    pub fn register_if_absent<F>(
        &self,
        id: &ParticipantId,
        transport: TransportKind,
        make_channel: F,
    ) -> bool
    where
        F: FnOnce() -> Arc<dyn DeliveryChannel>,
    {
        let mut inner = self.inner.lock();
        if inner.entries.contains_key(id) {
            return false;
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        let entry = ParticipantEntry::new(id.clone(), transport, make_channel());
        inner.entries.insert(id.clone(), Slot { seq, entry });
        inner.order.insert(seq, id.clone());
        true
    }

    /// 注销参与者，返回被删除的条目；不存在时为空操作。
    pub fn remove(&self, id: &str) -> Option<ParticipantEntry> {
        let mut inner = self.inner.lock();
        let slot = inner.entries.remove(id)?;
        inner.order.remove(&slot.seq);
        Some(slot.entry)
    }

    /// 翻转存活标记，返回身份是否存在。
    pub fn set_alive(&self, id: &str, alive: bool) -> bool {
        let mut inner = self.inner.lock();
        match inner.entries.get_mut(id) {
            Some(slot) => {
                slot.entry.alive = alive;
                true
            }
            None => false,
        }
    }

    /// 按注册顺序返回时间点拷贝。
    pub fn snapshot(&self) -> Vec<ParticipantEntry> {
        let inner = self.inner.lock();
        inner
            .order
            .values()
            .filter_map(|id| inner.entries.get(id))
            .map(|slot| slot.entry.clone())
            .collect()
    }

    /// 只含身份与传输类型的摘要快照，供外部监控使用。
    pub fn summaries(&self) -> Vec<ParticipantSummary> {
        let inner = self.inner.lock();
        inner
            .order
            .values()
            .filter_map(|id| inner.entries.get(id))
            .map(|slot| ParticipantSummary::from(&slot.entry))
            .collect()
    }

    /// 按身份查询条目拷贝。
    pub fn lookup(&self, id: &str) -> Option<ParticipantEntry> {
        self.inner.lock().entries.get(id).map(|slot| slot.entry.clone())
    }

    /// 身份是否已注册。
    pub fn contains(&self, id: &str) -> bool {
        self.inner.lock().entries.contains_key(id)
    }

    /// 当前条目数量。
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// 注册表是否为空。
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MemoryChannel;

    fn channel(id: &str) -> Arc<dyn DeliveryChannel> {
        Arc::new(MemoryChannel::new(id))
    }

    fn ids(registry: &ParticipantRegistry) -> Vec<String> {
        registry
            .snapshot()
            .into_iter()
            .map(|entry| entry.id.to_string())
            .collect()
    }

    #[test]
    fn snapshot_follows_registration_order() {
        let registry = ParticipantRegistry::new();
        for id in ["c", "a", "b"] {
            registry.register(id.into(), channel(id), TransportKind::Stream);
        }
        assert_eq!(ids(&registry), ["c", "a", "b"]);
    }

    /// 后写者胜：替换返回旧条目，新条目移至顺序末尾，身份仍只出现一次。
    #[test]
    fn reregistration_replaces_and_moves_to_tail() {
        let registry = ParticipantRegistry::new();
        registry.register("a".into(), channel("a"), TransportKind::Stream);
        registry.register("b".into(), channel("b"), TransportKind::Stream);
        let previous = registry.register("a".into(), channel("a"), TransportKind::Datagram);

        let previous = previous.expect("first registration must be returned");
        assert_eq!(previous.transport, TransportKind::Stream);
        assert_eq!(ids(&registry), ["b", "a"]);
        assert_eq!(
            registry.lookup("a").map(|entry| entry.transport),
            Some(TransportKind::Datagram)
        );
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn remove_is_noop_when_absent() {
        let registry = ParticipantRegistry::new();
        registry.register("a".into(), channel("a"), TransportKind::Stream);
        assert!(registry.remove("missing").is_none());
        assert!(registry.remove("a").is_some());
        assert!(registry.remove("a").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn register_if_absent_only_inserts_once() {
        let registry = ParticipantRegistry::new();
        let id = ParticipantId::from("udp-peer");
        assert!(registry.register_if_absent(&id, TransportKind::Datagram, || channel("udp-peer")));
        assert!(!registry.register_if_absent(&id, TransportKind::Datagram, || {
            panic!("channel factory must not run for a known id")
        }));
        assert_eq!(registry.len(), 1);
    }

    /// 快照是拷贝：之后的修改不会影响已取得的快照。
    #[test]
    fn snapshot_is_isolated_from_later_mutation() {
        let registry = ParticipantRegistry::new();
        registry.register("a".into(), channel("a"), TransportKind::Stream);
        let snapshot = registry.snapshot();
        registry.remove("a");
        registry.register("b".into(), channel("b"), TransportKind::Stream);

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id.as_str(), "a");
    }

    #[test]
    fn set_alive_flips_flag_in_later_snapshots() {
        let registry = ParticipantRegistry::new();
        registry.register("a".into(), channel("a"), TransportKind::Stream);
        assert!(registry.set_alive("a", false));
        assert!(!registry.set_alive("missing", false));
        let entry = registry.lookup("a").expect("entry");
        assert!(!entry.alive);
        assert!(!entry.is_reachable());
    }
}
