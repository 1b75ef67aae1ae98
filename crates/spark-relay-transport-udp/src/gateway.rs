//! # DatagramGateway：整个数据报传输的单一接收循环
//!
//! ## 核心意图（Why）
//! - 数据报没有持久连接可供“拥有”，因此不为每个对端派生任务：一个循环接收所有数据报，
//!   在循环内同步完成“来源 → 身份 → 首次注册 → 解析 → 路由”；
//! - 与 TCP 接入器互为对等任务，互不监督。
//!
//! ## 行为契约（What）
//! - 来源地址首次出现时铸造身份并注册为 `Datagram` 参与者，此后同一来源始终映射到同一身份；
//! - 可路由请求的回执（确认、错误提示）以数据报发回来源地址；
//! - 没有 KIND 前缀的文本只记录 debug 日志后丢弃，不回显；空数据报忽略；
//! - 超过 `max_datagram_size` 的数据报不路由，向来源回复 `[ERROR]`，与流式传输拒绝超长行对应；
//! - 接收错误记录后继续循环。
//!
//! ## 风险提示（Trade-offs）
//! - 数据报参与者永不注销：注册表中的这类条目会一直保留到进程重启，这是无连接传输的已知局限；
//! - 路由在循环内同步执行，一次慢速投递会推迟下一个数据报的处理。

use std::{net::SocketAddr, sync::Arc, time::Duration};

use spark_relay::{
    DeliveryChannel, InboundLine, ParticipantId, Relay, TransportKind, parse_line,
};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::{channel::UdpDeliveryChannel, error::UdpRelayError, origin::OriginTable};

/// 网关配置。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GatewayConfig {
    /// 可接受的最大数据报字节数，更长的数据报被拒绝。
    pub max_datagram_size: usize,
    /// 回源发送超时。
    pub write_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_datagram_size: 1024,
            write_timeout: Duration::from_millis(2000),
        }
    }
}

/// 数据报网关。
#[derive(Debug)]
pub struct DatagramGateway {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    relay: Relay,
    origins: OriginTable,
    config: GatewayConfig,
}

impl DatagramGateway {
    /// 绑定 UDP 套接字。
    pub async fn bind(
        addr: SocketAddr,
        relay: Relay,
        config: GatewayConfig,
    ) -> Result<Self, UdpRelayError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| UdpRelayError::Bind { addr, source })?;
        let local_addr = socket
            .local_addr()
            .map_err(|source| UdpRelayError::Bind { addr, source })?;
        Ok(Self {
            socket: Arc::new(socket),
            local_addr,
            relay,
            origins: OriginTable::new(),
            config,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 来源地址到身份的映射表。
    pub fn origins(&self) -> &OriginTable {
        &self.origins
    }

    /// 接收循环，永不正常返回。
    pub async fn run(self) {
        info!(local = %self.local_addr, "udp gateway listening");
        // 多留一个字节，才能区分“恰好等于上限”与“被截断”。
        let mut buffer = vec![0_u8; self.config.max_datagram_size + 1];
        loop {
            match self.socket.recv_from(&mut buffer).await {
                Ok((len, origin)) => self.handle_datagram(&buffer[..len], origin).await,
                Err(source) => {
                    let error = UdpRelayError::Recv {
                        local: self.local_addr,
                        source,
                    };
                    warn!(code = error.code(), %error, "datagram receive failed, continuing");
                }
            }
        }
    }

    /// 处理一个数据报：解析来源身份、首次注册、解析请求并路由。
    ///
    /// # 教案式注释
    /// - **契约 (What)**：调用返回时，该数据报触发的全部投递与回执都已完成；
    /// - **执行 (How)**：`register_if_absent` 把“是否已注册”的判断与插入放在注册表同一临界区内，
    ///   回执通道与注册条目中的通道指向同一共享套接字。
    pub async fn handle_datagram(&self, bytes: &[u8], origin: SocketAddr) {
        let (id, first_seen) = self
            .origins
            .resolve(origin, |addr| self.relay.id_clock().mint(addr));
        let reply_channel = self.channel_for(&id, origin);
        let inserted = self.relay.registry().register_if_absent(&id, TransportKind::Datagram, || {
            Arc::clone(&reply_channel) as Arc<dyn DeliveryChannel>
        });
        if inserted {
            info!(participant = %id, peer = %origin, first_seen, "datagram participant registered");
        }

        if bytes.len() > self.config.max_datagram_size {
            warn!(
                participant = %id,
                peer = %origin,
                limit = self.config.max_datagram_size,
                "oversized datagram rejected"
            );
            let notice = format!(
                "[ERROR] mensaje demasiado largo (maximo {} bytes)",
                self.config.max_datagram_size
            );
            self.reply(&reply_channel, &id, &notice).await;
            return;
        }

        let text = String::from_utf8_lossy(bytes);
        match parse_line(&id, &text) {
            Ok(InboundLine::Empty) => {}
            Ok(InboundLine::Echo(text)) => {
                debug!(participant = %id, peer = %origin, %text, "unprefixed datagram dropped");
            }
            Ok(InboundLine::Route(request)) => {
                let outcome = self.relay.engine().route(&request).await;
                for reply in &outcome.replies {
                    self.reply(&reply_channel, &id, reply).await;
                }
            }
            Err(error) => {
                debug!(participant = %id, peer = %origin, %error, "malformed datagram request");
                self.reply(&reply_channel, &id, &format!("[ERROR] {error}"))
                    .await;
            }
        }
    }

    fn channel_for(&self, id: &ParticipantId, origin: SocketAddr) -> Arc<UdpDeliveryChannel> {
        Arc::new(UdpDeliveryChannel::new(
            id.clone(),
            Arc::clone(&self.socket),
            origin,
            self.config.write_timeout,
        ))
    }

    async fn reply(&self, channel: &UdpDeliveryChannel, id: &ParticipantId, text: &str) {
        if let Err(error) = channel.send(text).await {
            warn!(participant = %id, %error, "reply to datagram sender failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    async fn gateway() -> DatagramGateway {
        DatagramGateway::bind(
            "127.0.0.1:0".parse().expect("addr"),
            Relay::new(),
            GatewayConfig::default(),
        )
        .await
        .expect("bind")
    }

    /// 无前缀数据报：来源照常注册，文本只进日志。
    #[tokio::test(flavor = "multi_thread")]
    #[traced_test]
    async fn unprefixed_text_registers_origin_and_is_only_logged() {
        let gateway = gateway().await;
        let origin: SocketAddr = "127.0.0.1:9".parse().expect("addr");

        gateway.handle_datagram(b"hola servidor", origin).await;

        assert_eq!(gateway.relay.participant_counts(), (0, 1));
        assert!(gateway.origins().lookup(&origin).is_some());
        assert!(logs_contain("unprefixed datagram dropped"));
    }

    /// 超长数据报不会以截断后的内容被路由，来源收到错误提示。
    #[tokio::test(flavor = "multi_thread")]
    #[traced_test]
    async fn oversized_datagram_is_rejected_not_routed() {
        let gateway = DatagramGateway::bind(
            "127.0.0.1:0".parse().expect("addr"),
            Relay::new(),
            GatewayConfig {
                max_datagram_size: 32,
                ..GatewayConfig::default()
            },
        )
        .await
        .expect("bind");
        let client = UdpSocket::bind("127.0.0.1:0").await.expect("bind client");
        let origin = client.local_addr().expect("local addr");
        let bystander: SocketAddr = "127.0.0.1:9".parse().expect("addr");
        gateway.handle_datagram(b"hola", bystander).await;

        let oversized = format!("BROADCAST:{}", "x".repeat(64));
        gateway.handle_datagram(oversized.as_bytes(), origin).await;

        let mut buffer = [0_u8; 256];
        let (len, from) = tokio::time::timeout(
            Duration::from_secs(5),
            client.recv_from(&mut buffer),
        )
        .await
        .expect("timed out waiting for the rejection")
        .expect("recv");
        assert_eq!(from, gateway.local_addr());
        assert_eq!(
            String::from_utf8_lossy(&buffer[..len]),
            "[ERROR] mensaje demasiado largo (maximo 32 bytes)"
        );
        assert_eq!(gateway.relay.total_routed_messages(), 0);
        assert!(logs_contain("oversized datagram rejected"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_datagram_is_ignored_but_origin_is_known() {
        let gateway = gateway().await;
        let origin: SocketAddr = "127.0.0.1:9".parse().expect("addr");

        gateway.handle_datagram(b"  \r\n", origin).await;
        gateway.handle_datagram(b"", origin).await;

        assert_eq!(gateway.origins().len(), 1);
        assert_eq!(gateway.relay.total_routed_messages(), 0);
    }
}
