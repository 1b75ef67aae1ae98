use std::{net::SocketAddr, sync::Arc};

use dashmap::{DashMap, mapref::entry::Entry};
use spark_relay::ParticipantId;

/// `OriginTable` 把数据报来源地址固定映射到参与者身份。
///
/// # 教案式解读
/// - **意图（Why）**：
///   - 数据报没有连接，身份只能由来源 `ip:port` 推导；为了让同一来源在本次运行内始终对应同一身份，
///     首次见到时铸造的身份需要被记住，而不是每个数据报重新加时间戳；
///   - 以 `DashMap` 封装，网关循环与状态查询可以并发读取。
/// - **契约（What）**：
///   - [`resolve`](Self::resolve) 对同一地址只调用一次 `mint`，返回 `(身份, 是否首次见到)`；
///   - 条目只增不减，与注册表中数据报参与者“永不注销”的行为一致。
/// - **风险提示**：来源端口被 NAT 复用给另一台主机时，会被视为同一参与者。
#[derive(Debug, Clone, Default)]
pub struct OriginTable {
    inner: Arc<DashMap<SocketAddr, ParticipantId>>,
}

impl OriginTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 解析来源对应的身份，首次见到时以 `mint` 铸造。
    pub fn resolve<F>(&self, origin: SocketAddr, mint: F) -> (ParticipantId, bool)
    where
        F: FnOnce(SocketAddr) -> ParticipantId,
    {
        match self.inner.entry(origin) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                let id = mint(origin);
                entry.insert(id.clone());
                (id, true)
            }
        }
    }

    /// 查询已知来源的身份。
    pub fn lookup(&self, origin: &SocketAddr) -> Option<ParticipantId> {
        self.inner.get(origin).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
