//! TCP 传输错误。
//!
//! - **意图 (Why)**：绑定、接受、读取与写入失败都需要带上“哪个操作、哪个地址”，
//!   并给运维一个稳定的错误码用于检索日志；
//! - **契约 (What)**：只有 [`TcpRelayError::Bind`] 会在启动阶段向上传播为致命错误，
//!   其余变体都在接入循环或会话内部被记录后消化。

use std::{io, net::SocketAddr, time::Duration};

use spark_relay::{DeliveryError, ParticipantId};
use thiserror::Error;

use crate::session::SessionState;

/// TCP 传输层错误。
#[derive(Debug, Error)]
pub enum TcpRelayError {
    /// 监听地址绑定失败（端口占用、权限不足等）。
    #[error("tcp bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// 监听器接受连接失败；接入循环记录后继续。
    #[error("tcp accept on {local}: {source}")]
    Accept {
        local: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// 会话读取失败或收到超长行，会话随之关闭。
    #[error("tcp read from {peer}: {detail}")]
    Read { peer: SocketAddr, detail: String },

    /// 写入对端失败。
    #[error("tcp write to {peer}: {source}")]
    Write {
        peer: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// 写入对端超过配置的写超时。
    #[error("tcp write to {peer} timed out after {timeout:?}")]
    WriteTimeout { peer: SocketAddr, timeout: Duration },

    /// 出站通道已因写失败或写超时失效，会话随之关闭。
    #[error("tcp peer {peer} stopped accepting writes")]
    Unwritable { peer: SocketAddr },

    /// 会话状态机拒绝的跃迁。
    #[error("session {participant}: invalid transition {from:?} -> {to:?}")]
    InvalidTransition {
        participant: ParticipantId,
        from: SessionState,
        to: SessionState,
    },
}

impl TcpRelayError {
    /// 稳定错误码，便于日志检索与告警规则匹配。
    pub fn code(&self) -> &'static str {
        match self {
            TcpRelayError::Bind { .. } => "spark.relay.tcp.bind_failed",
            TcpRelayError::Accept { .. } => "spark.relay.tcp.accept_failed",
            TcpRelayError::Read { .. } => "spark.relay.tcp.read_failed",
            TcpRelayError::Write { .. } => "spark.relay.tcp.write_failed",
            TcpRelayError::WriteTimeout { .. } => "spark.relay.tcp.write_timeout",
            TcpRelayError::Unwritable { .. } => "spark.relay.tcp.unwritable",
            TcpRelayError::InvalidTransition { .. } => "spark.relay.tcp.invalid_transition",
        }
    }

    /// 将写路径错误折叠为路由核心的 `TransportFailed`。
    pub(crate) fn into_delivery(self, id: ParticipantId) -> DeliveryError {
        DeliveryError::transport(id, self.to_string())
    }
}
