//! # Relay：注册表、路由引擎与身份时钟的装配点
//!
//! ## 核心意图（Why）
//! - 传输层需要同时访问注册表（注册/注销）、路由引擎（投递）与身份时钟（铸造身份），
//!   用一个可廉价克隆的句柄统一注入，避免在每个会话里分别传递三份 `Arc`；
//! - 同时向控制台/监控暴露只读状态：在线快照、累计投递数与分传输的参与者数量。

use std::sync::Arc;

use crate::{
    participant::{IdClock, ParticipantSummary, TransportKind},
    registry::ParticipantRegistry,
    routing::RoutingEngine,
};

/// 中继核心的共享句柄。
///
/// # 教案式注释
/// - **契约 (What)**：克隆只增加引用计数，所有克隆共享同一注册表、同一计数器与同一身份时钟；
/// - **风险 (Trade-offs)**：状态查询各自独立加锁，`participant_counts` 与 `registry_snapshot`
///   连续调用之间可能观察到不同的时间点。
#[derive(Clone, Debug)]
pub struct Relay {
    registry: Arc<ParticipantRegistry>,
    engine: Arc<RoutingEngine>,
    id_clock: Arc<IdClock>,
}

impl Default for Relay {
    fn default() -> Self {
        Self::new()
    }
}

impl Relay {
    /// 创建空中继。
    pub fn new() -> Self {
        let registry = Arc::new(ParticipantRegistry::new());
        let engine = Arc::new(RoutingEngine::new(Arc::clone(&registry)));
        Self {
            registry,
            engine,
            id_clock: Arc::new(IdClock::new()),
        }
    }

    pub fn registry(&self) -> &Arc<ParticipantRegistry> {
        &self.registry
    }

    pub fn engine(&self) -> &Arc<RoutingEngine> {
        &self.engine
    }

    pub fn id_clock(&self) -> &IdClock {
        &self.id_clock
    }

    /// 按注册顺序的在线参与者摘要。
    pub fn registry_snapshot(&self) -> Vec<ParticipantSummary> {
        self.registry.summaries()
    }

    /// 自启动以来成功投递的消息数。
    pub fn total_routed_messages(&self) -> u64 {
        self.engine.total_routed_messages()
    }

    /// `(流式, 数据报)` 参与者数量。
    pub fn participant_counts(&self) -> (usize, usize) {
        self.registry
            .summaries()
            .iter()
            .fold((0, 0), |(stream, datagram), summary| match summary.transport {
                TransportKind::Stream => (stream + 1, datagram),
                TransportKind::Datagram => (stream, datagram + 1),
            })
    }
}
