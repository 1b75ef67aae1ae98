use std::{io, net::SocketAddr, time::Duration};

use spark_relay::{DeliveryError, ParticipantId};
use thiserror::Error;

/// UDP 传输层错误。
///
/// # 教案式说明
/// - **意图 (Why)**：与 TCP 传输保持同一套“操作 + 地址 + 稳定错误码”的诊断形态；
/// - **契约 (What)**：仅 [`UdpRelayError::Bind`] 在启动阶段致命；接收与发送错误在网关循环内记录后继续。
#[derive(Debug, Error)]
pub enum UdpRelayError {
    /// 套接字绑定失败。
    #[error("udp bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// 接收数据报失败（例如 ICMP 端口不可达在部分平台上以错误形式返回）。
    #[error("udp recv on {local}: {source}")]
    Recv {
        local: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// 向对端发送数据报失败。
    #[error("udp send to {peer}: {source}")]
    Send {
        peer: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// 发送超过写超时。
    #[error("udp send to {peer} timed out after {timeout:?}")]
    SendTimeout { peer: SocketAddr, timeout: Duration },
}

impl UdpRelayError {
    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            UdpRelayError::Bind { .. } => "spark.relay.udp.bind_failed",
            UdpRelayError::Recv { .. } => "spark.relay.udp.recv_failed",
            UdpRelayError::Send { .. } => "spark.relay.udp.send_failed",
            UdpRelayError::SendTimeout { .. } => "spark.relay.udp.send_timeout",
        }
    }

    pub(crate) fn into_delivery(self, id: ParticipantId) -> DeliveryError {
        DeliveryError::transport(id, self.to_string())
    }
}
