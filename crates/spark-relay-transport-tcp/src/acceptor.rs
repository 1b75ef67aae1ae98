use std::{net::SocketAddr, time::Duration};

use spark_relay::Relay;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::{
    error::TcpRelayError,
    session::{ParticipantSession, SessionConfig},
};

/// 接受失败后的退避时间，避免文件描述符耗尽等持续性错误让循环空转。
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// 流式接入器：接受连接并为每个连接派生独立的会话任务。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 接入循环与各会话互为对等任务，接入器不监督也不等待会话；
/// - 只有绑定失败是致命的，`accept` 错误记录后继续。
///
/// ## 契约 (What)
/// - **前置条件**：在 Tokio 多线程运行时中调用；
/// - **后置条件**：[`run`](Self::run) 永不正常返回，由外部通过丢弃/中止任务结束；
///   每个接受的连接都会在自己的任务中完成注册、接收与关闭。
#[derive(Debug)]
pub struct ConnectionAcceptor {
    listener: TcpListener,
    local_addr: SocketAddr,
    relay: Relay,
    config: SessionConfig,
}

impl ConnectionAcceptor {
    /// 绑定监听地址。
    pub async fn bind(
        addr: SocketAddr,
        relay: Relay,
        config: SessionConfig,
    ) -> Result<Self, TcpRelayError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TcpRelayError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| TcpRelayError::Bind { addr, source })?;
        Ok(Self {
            listener,
            local_addr,
            relay,
            config,
        })
    }

    /// 实际绑定地址（绑定端口 0 时可据此获知系统分配的端口）。
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 接入循环。
    pub async fn run(self) {
        info!(local = %self.local_addr, "tcp acceptor listening");
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => self.spawn_session(stream, peer),
                Err(source) => {
                    let error = TcpRelayError::Accept {
                        local: self.local_addr,
                        source,
                    };
                    warn!(code = error.code(), %error, "accept failed, continuing");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }

    fn spawn_session(&self, stream: tokio::net::TcpStream, peer: SocketAddr) {
        let relay = self.relay.clone();
        let config = self.config;
        tokio::spawn(async move {
            let session = match ParticipantSession::start(relay, stream, peer, config).await {
                Ok(session) => session,
                Err(error) => {
                    warn!(peer = %peer, code = error.code(), %error, "session failed to start");
                    return;
                }
            };
            let participant = session.id().clone();
            if let Err(error) = session.run().await {
                warn!(participant = %participant, peer = %peer, code = error.code(), %error, "session ended with error");
            }
        });
    }
}
