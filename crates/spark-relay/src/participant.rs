//! # 参与者身份与注册条目
//!
//! ## 核心意图（Why）
//! - 将“谁在线”抽象为 [`ParticipantId`] + [`ParticipantEntry`]，让注册表、路由引擎与两种传输
//!   共享同一份强类型身份，而不是在各处拼接字符串；
//! - 身份由传输来源（地址 + 端口）加上一个进程内单调的毫秒时间戳组成，保证在条目存活期间
//!   不会被复用。
//!
//! ## 契约（What）
//! - 文本形式：IPv4 为 `<ip>:<port>:<millis>`，IPv6 为 `[<ip>]:<port>:<millis>`；
//! - [`IdClock`] 永不重复发放同一个时间戳（`max(now, last + 1)`），同一毫秒内接入的两个连接
//!   也会得到不同的身份；
//! - [`ParticipantEntry`] 的 `channel` 恒为有效句柄，克隆条目只增加引用计数。

use std::{
    borrow::Borrow,
    fmt,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{SystemTime, UNIX_EPOCH},
};

use crate::channel::DeliveryChannel;

/// 参与者的不透明身份。
///
/// # 教案式说明
/// - **意图 (Why)**：以 `Arc<str>` 承载，快照、日志与路由结果之间传递时只做引用计数；
/// - **契约 (What)**：实现 `Borrow<str>`，注册表可以直接用 `&str` 查询；
/// - **风险 (Trade-offs)**：不校验文本格式，外部输入（例如 `UNICAST:Z:hi` 中的 `Z`）也能构造身份，
///   由注册表决定是否命中。
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParticipantId(Arc<str>);

impl ParticipantId {
    /// 由任意文本构造身份。
    pub fn new(raw: impl Into<Arc<str>>) -> Self {
        Self(raw.into())
    }

    /// 根据传输来源与时间戳生成规范身份。
    pub fn from_origin(origin: SocketAddr, stamp_millis: u64) -> Self {
        // `SocketAddr` 的 Display 已经为 IPv6 加上方括号。
        Self::new(format!("{origin}:{stamp_millis}"))
    }

    /// 返回身份文本。
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ParticipantId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ParticipantId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ParticipantId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// 参与者接入所使用的传输类型。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// 面向连接、有显式关闭信号的流式传输（TCP）。
    Stream,
    /// 无连接的数据报传输（UDP），没有关闭信号。
    Datagram,
}

impl TransportKind {
    /// 稳定的小写标签，用于日志字段。
    pub fn as_str(self) -> &'static str {
        match self {
            TransportKind::Stream => "stream",
            TransportKind::Datagram => "datagram",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 注册表中的一条参与者记录。
///
/// # 教案式说明
/// - **意图 (Why)**：快照需要把“身份 + 投递句柄 + 存活标记”一次性拷贝出去，路由引擎在锁外执行 I/O；
/// - **契约 (What)**：
///   - `channel` 由拥有该参与者的会话（或数据报网关）创建，注册表之外没有其他写者；
///   - `alive` 仅由注册表翻转（见 [`ParticipantRegistry::set_alive`](crate::ParticipantRegistry::set_alive)）；
/// - **风险 (Trade-offs)**：快照中的 `alive` 是拷贝时刻的值，路由过程中可能已经过期，
///   因此投递前还会询问 [`DeliveryChannel::is_alive`]。
#[derive(Clone)]
pub struct ParticipantEntry {
    pub id: ParticipantId,
    pub transport: TransportKind,
    pub channel: Arc<dyn DeliveryChannel>,
    pub alive: bool,
}

impl ParticipantEntry {
    /// 构造一个存活的条目。
    pub fn new(id: ParticipantId, transport: TransportKind, channel: Arc<dyn DeliveryChannel>) -> Self {
        Self {
            id,
            transport,
            channel,
            alive: true,
        }
    }

    /// 条目当前是否可以尝试投递：注册表标记与通道自身的存活信号都必须为真。
    pub fn is_reachable(&self) -> bool {
        self.alive && self.channel.is_alive()
    }
}

impl fmt::Debug for ParticipantEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParticipantEntry")
            .field("id", &self.id)
            .field("transport", &self.transport)
            .field("alive", &self.alive)
            .finish_non_exhaustive()
    }
}

/// 提供给控制台/监控等外部协作方的只读摘要。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParticipantSummary {
    pub id: ParticipantId,
    pub transport: TransportKind,
}

impl From<&ParticipantEntry> for ParticipantSummary {
    fn from(entry: &ParticipantEntry) -> Self {
        Self {
            id: entry.id.clone(),
            transport: entry.transport,
        }
    }
}

/// 进程内单调的身份时钟。
///
/// # 教案式说明
/// - **意图 (Why)**：墙钟毫秒在同一毫秒内接入多个连接时会重复，而身份在存活期间不得复用；
/// - **逻辑 (How)**：CAS 循环维护“上次发放值”，新值取 `max(now_millis, last + 1)`；
/// - **契约 (What)**：多线程并发调用 [`next_stamp`](Self::next_stamp) 得到的值两两不同且严格递增；
/// - **风险 (Trade-offs)**：墙钟回拨时时间戳会暂时超前于真实时间，但仍保持唯一。
#[derive(Debug, Default)]
pub struct IdClock {
    last: AtomicU64,
}

impl IdClock {
    /// 创建新的时钟。
    pub fn new() -> Self {
        Self::default()
    }

    /// 发放下一个唯一的毫秒时间戳。
    pub fn next_stamp(&self) -> u64 {
        let now = wall_clock_millis();
        let mut current = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(current.saturating_add(1));
            match self.last.compare_exchange_weak(
                current,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return candidate,
                Err(observed) => current = observed,
            }
        }
    }

    /// 为给定来源生成新的身份。
    pub fn mint(&self, origin: SocketAddr) -> ParticipantId {
        ParticipantId::from_origin(origin, self.next_stamp())
    }
}

fn wall_clock_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn origin_ids_keep_socket_addr_shape() {
        let v4: SocketAddr = "127.0.0.1:5000".parse().expect("v4");
        let v6: SocketAddr = "[::1]:5000".parse().expect("v6");
        assert_eq!(ParticipantId::from_origin(v4, 42).as_str(), "127.0.0.1:5000:42");
        assert_eq!(ParticipantId::from_origin(v6, 42).as_str(), "[::1]:5000:42");
    }

    /// 多线程并发铸造身份时不得出现重复时间戳。
    #[test]
    fn clock_never_repeats_under_contention() {
        let clock = Arc::new(IdClock::new());
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let clock = Arc::clone(&clock);
                thread::spawn(move || (0..500).map(|_| clock.next_stamp()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for worker in workers {
            for stamp in worker.join().expect("worker must not panic") {
                assert!(seen.insert(stamp), "duplicate stamp {stamp}");
            }
        }
        assert_eq!(seen.len(), 2000);
    }

    #[test]
    fn same_origin_same_millisecond_yields_distinct_ids() {
        let clock = IdClock::new();
        let origin: SocketAddr = "10.0.0.7:40000".parse().expect("addr");
        let first = clock.mint(origin);
        let second = clock.mint(origin);
        assert_ne!(first, second);
    }
}
