//! # spark-relay-transport-tcp
//!
//! ## 定位与职责（Why）
//! - 为中继提供流式接入：每个 TCP 连接是一个参与者，拥有自己的接收循环；
//! - 以 `LinesCodec` 按行分帧，行尾 `\r` 与超长行在分帧层处理。
//!
//! ## 架构嵌入（Where）
//! - [`ConnectionAcceptor`]：监听并派生会话；
//! - [`ParticipantSession`]：`Connecting -> Registered -> Receiving -> Closing -> Closed` 状态机；
//! - [`TcpDeliveryChannel`]：写半部的串行化投递通道，实现 [`spark_relay::DeliveryChannel`]；
//! - [`TcpRelayError`]：带稳定错误码的传输错误。

mod acceptor;
mod channel;
mod error;
mod session;

pub use acceptor::ConnectionAcceptor;
pub use channel::TcpDeliveryChannel;
pub use error::TcpRelayError;
pub use session::{ParticipantSession, SessionConfig, SessionState};
