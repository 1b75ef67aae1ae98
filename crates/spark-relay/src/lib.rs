//! # spark-relay
//!
//! ## 定位与职责（Why）
//! - 多传输聊天中继的核心：维护在线参与者注册表，并按单播、广播、任播、组播四种语义
//!   把一行文本投递给其他参与者；
//! - 与具体传输无关。TCP 会话与 UDP 网关分别位于 `spark-relay-transport-tcp` 与
//!   `spark-relay-transport-udp`，它们只需实现 [`DeliveryChannel`] 并调用 [`RoutingEngine::route`]。
//!
//! ## 架构嵌入（Where）
//! - `participant`：身份、注册条目与身份时钟；
//! - `registry`：并发安全的注册表，快照按注册顺序；
//! - `request`：请求行语法与解析；
//! - `routing`：投递语义与结果记录；
//! - `relay`：面向传输与控制台的装配句柄。
//!
//! ## 并发约定（Trade-offs）
//! - 注册表临界区内不做任何 I/O；路由在调用方上下文中完成，不存在中心调度任务；
//! - 投递失败只影响该收件人，并以文字提示回给发送者，不会终止任何会话。

/// 出站投递抽象。
pub mod channel;
/// 投递与解析错误。
pub mod error;
pub mod participant;
/// 在线参与者注册表。
///
/// - **契约定位 (What)**：唯一事实来源，`register`/`remove` 只由拥有者会话或网关调用；
/// - **风险提示 (Trade-offs)**：数据报条目没有注销信号，会一直保留到进程重启。
pub mod registry;
pub mod relay;
/// 请求行解析。
pub mod request;
pub mod routing;

#[cfg(any(test, feature = "test-util"))]
pub use channel::MemoryChannel;
pub use channel::DeliveryChannel;
pub use error::{DeliveryError, MalformedRequest};
pub use participant::{
    IdClock, ParticipantEntry, ParticipantId, ParticipantSummary, TransportKind,
};
pub use registry::ParticipantRegistry;
pub use relay::Relay;
pub use request::{InboundLine, RequestKind, RoutingRequest, parse_line};
pub use routing::{RecipientOutcome, RoutingEngine, RoutingOutcome};
