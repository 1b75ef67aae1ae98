use std::net::SocketAddr;

use anyhow::{Context, Result};
use spark_relay::Relay;
use spark_relay_transport_tcp::ConnectionAcceptor;
use spark_relay_transport_udp::DatagramGateway;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::RelayConfig;

/// 已绑定但尚未运行的中继服务端。
///
/// # 教案式注释
/// - **意图 (Why)**：先完成两个传输的绑定，绑定失败即为启动错误；绑定成功后才派生任务，
///   调用方（包括测试）可以在运行前读取实际端口；
/// - **契约 (What)**：两个传输共享同一个 [`Relay`]，TCP 与 UDP 参与者互相可见、可互相投递。
#[derive(Debug)]
pub struct RelayServer {
    relay: Relay,
    acceptor: ConnectionAcceptor,
    gateway: DatagramGateway,
}

impl RelayServer {
    pub async fn bind(config: &RelayConfig) -> Result<Self> {
        let relay = Relay::new();
        let acceptor =
            ConnectionAcceptor::bind(config.tcp_bind, relay.clone(), config.session_config())
                .await
                .context("failed to start stream transport")?;
        let gateway =
            DatagramGateway::bind(config.udp_bind, relay.clone(), config.gateway_config())
                .await
                .context("failed to start datagram transport")?;
        Ok(Self {
            relay,
            acceptor,
            gateway,
        })
    }

    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    pub fn tcp_addr(&self) -> SocketAddr {
        self.acceptor.local_addr()
    }

    pub fn udp_addr(&self) -> SocketAddr {
        self.gateway.local_addr()
    }

    /// 把两个传输作为对等任务运行。
    pub fn spawn(self) -> RunningServer {
        info!(tcp = %self.tcp_addr(), udp = %self.udp_addr(), "relay server started");
        RunningServer {
            relay: self.relay,
            stream_task: tokio::spawn(self.acceptor.run()),
            datagram_task: tokio::spawn(self.gateway.run()),
        }
    }
}

/// 运行中的服务端句柄。
#[derive(Debug)]
pub struct RunningServer {
    relay: Relay,
    stream_task: JoinHandle<()>,
    datagram_task: JoinHandle<()>,
}

impl RunningServer {
    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    /// 记录当前状态：分传输的参与者数量与累计投递数。
    pub fn log_status(&self) {
        let (stream, datagram) = self.relay.participant_counts();
        info!(
            stream,
            datagram,
            total = stream + datagram,
            routed = self.relay.total_routed_messages(),
            "relay status"
        );
    }

    /// 停止接入新的连接与数据报。已建立的会话任务不受影响，随运行时退出而结束。
    pub fn shutdown(self) {
        self.stream_task.abort();
        self.datagram_task.abort();
    }
}
