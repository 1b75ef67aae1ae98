use std::{net::SocketAddr, sync::Arc, time::Duration};

use async_trait::async_trait;
use spark_relay::{DeliveryChannel, DeliveryError, ParticipantId};
use tokio::{net::UdpSocket, time::timeout};

use crate::error::UdpRelayError;

/// 通过网关共享套接字回源投递的数据报通道。
///
/// - **契约 (What)**：每次 `send` 发送一个独立数据报，内容即文本本身（不追加换行）；
///   `UdpSocket::send_to` 只需 `&self`，并发调用天然安全，单个数据报不会与其他数据报交错；
/// - **风险 (Trade-offs)**：无连接传输没有关闭信号，`is_alive` 恒为 `true`，
///   投递成功只代表数据报已交给内核。
#[derive(Debug)]
pub struct UdpDeliveryChannel {
    id: ParticipantId,
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
    write_timeout: Duration,
}

impl UdpDeliveryChannel {
    pub fn new(
        id: ParticipantId,
        socket: Arc<UdpSocket>,
        peer: SocketAddr,
        write_timeout: Duration,
    ) -> Self {
        Self {
            id,
            socket,
            peer,
            write_timeout,
        }
    }

    async fn send_datagram(&self, text: &str) -> Result<(), UdpRelayError> {
        match timeout(self.write_timeout, self.socket.send_to(text.as_bytes(), self.peer)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(source)) => Err(UdpRelayError::Send {
                peer: self.peer,
                source,
            }),
            Err(_) => Err(UdpRelayError::SendTimeout {
                peer: self.peer,
                timeout: self.write_timeout,
            }),
        }
    }
}

#[async_trait]
impl DeliveryChannel for UdpDeliveryChannel {
    async fn send(&self, text: &str) -> Result<(), DeliveryError> {
        self.send_datagram(text)
            .await
            .map_err(|error| error.into_delivery(self.id.clone()))
    }

    fn is_alive(&self) -> bool {
        true
    }
}
