//! # ParticipantSession：一个 TCP 参与者的生命周期与接收循环
//!
//! ## 核心意图（Why）
//! - 每个连接独占一个接收循环，逐行解析并在本任务内同步调用路由引擎，
//!   因而同一发送者的请求天然按接收顺序（FIFO）路由；
//! - 连接终止时保证注册条目恰好被移除一次，注册表不会残留已断开的流式参与者。
//!
//! ## 状态机（What）
//! `Connecting -> Registered -> Receiving -> Closing -> Closed`
//! - `Connecting`：握手完成，依据对端地址与身份时钟铸造身份；
//! - `Registered`：写入注册表，并只在本会话自己的通道上发送欢迎语；
//! - `Receiving`：读取循环，直到对端关闭、出现不可恢复的读取错误（含超长行），
//!   或出站通道因写失败/写超时而失效；
//! - `Closing`：先翻转存活标记再移除条目，幂等；
//! - `Closed`：资源释放完毕，不再接受任何操作。
//!
//! ## 风险提示（Trade-offs）
//! - 没有空闲超时：静默但不断开的连接会一直占据注册表条目；
//! - 一次写超时即结束会话：暂时读得慢的客户端会被断开，需要重新连接并获得新身份；
//! - 会话任务被外部中止时，由 [`Registration`] 的 `Drop` 兜底移除条目。

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use futures::StreamExt;
use spark_relay::{
    DeliveryChannel, InboundLine, ParticipantId, Relay, TransportKind, parse_line,
};
use tokio::net::{TcpStream, tcp::OwnedReadHalf};
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tracing::{debug, info, warn};

use crate::{channel::TcpDeliveryChannel, error::TcpRelayError};

/// 会话状态。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionState {
    Connecting,
    Registered,
    Receiving,
    Closing,
    Closed,
}

impl SessionState {
    /// 判断状态是否允许跃迁至 `target`。
    ///
    /// - **契约 (What)**：只允许沿生命周期前进；任意非终止态都可以直接进入 `Closing`
    ///   （例如欢迎语发送前对端已断开）；`Closed` 之后不再有合法跃迁。
    pub fn can_transition_to(self, target: SessionState) -> bool {
        matches!(
            (self, target),
            (SessionState::Connecting, SessionState::Registered)
                | (SessionState::Connecting, SessionState::Closing)
                | (SessionState::Registered, SessionState::Receiving)
                | (SessionState::Registered, SessionState::Closing)
                | (SessionState::Receiving, SessionState::Closing)
                | (SessionState::Closing, SessionState::Closed)
        )
    }

}

/// 会话级配置。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// 单行最大字节数（不含换行），超过即视为不可恢复的读取错误。
    pub max_line_length: usize,
    /// 出站写超时。
    pub write_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_line_length: 4096,
            write_timeout: Duration::from_millis(2000),
        }
    }
}

/// 注册表成员资格的所有权凭证。
///
/// # 教案式注释
/// - **意图 (Why)**：把“移除恰好一次”收敛到一个原子标记上，正常关闭与 `Drop` 兜底共用同一入口；
/// - **契约 (What)**：[`release`](Self::release) 只有第一次调用会触碰注册表，返回是否真的删除了条目。
#[derive(Debug)]
struct Registration {
    relay: Relay,
    id: ParticipantId,
    released: AtomicBool,
}

impl Registration {
    fn release(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        let registry = self.relay.registry();
        registry.set_alive(self.id.as_str(), false);
        registry.remove(self.id.as_str()).is_some()
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if self.release() {
            debug!(participant = %self.id, "registration released on drop");
        }
    }
}

/// 一个已接入的 TCP 参与者。
#[derive(Debug)]
pub struct ParticipantSession {
    relay: Relay,
    id: ParticipantId,
    peer: SocketAddr,
    state: SessionState,
    channel: Arc<TcpDeliveryChannel>,
    lines: FramedRead<OwnedReadHalf, LinesCodec>,
    registration: Option<Registration>,
}

impl ParticipantSession {
    /// 完成 `Connecting -> Registered`：铸造身份、注册并发送欢迎语。
    ///
    /// # 教案式注释
    /// - **契约 (What)**：返回时条目已在注册表中；欢迎语发送失败不会使本函数失败，
    ///   随后的读取循环会观察到连接终止并走正常关闭路径；
    /// - **执行 (How)**：先注册、后欢迎，客户端读到欢迎语即意味着自己已可被路由。
    pub async fn start(
        relay: Relay,
        stream: TcpStream,
        peer: SocketAddr,
        config: SessionConfig,
    ) -> Result<Self, TcpRelayError> {
        let id = relay.id_clock().mint(peer);
        let (reader, writer) = stream.into_split();
        let channel = Arc::new(TcpDeliveryChannel::new(
            id.clone(),
            peer,
            writer,
            config.write_timeout,
        ));
        let mut session = Self {
            relay,
            id,
            peer,
            state: SessionState::Connecting,
            channel,
            lines: FramedRead::new(reader, LinesCodec::new_with_max_length(config.max_line_length)),
            registration: None,
        };
        session.register()?;
        session
            .reply(&format!("Bienvenido al servidor! Tu ID: {}", session.id))
            .await;
        Ok(session)
    }

    pub fn id(&self) -> &ParticipantId {
        &self.id
    }

    /// `Receiving` 循环，结束后完成关闭。
    ///
    /// 对端正常关闭返回 `Ok(())`；读取失败或超长行返回 [`TcpRelayError::Read`]；
    /// 出站通道失效返回 [`TcpRelayError::Unwritable`]。任何一种结局下条目都已被移除。
    pub async fn run(mut self) -> Result<(), TcpRelayError> {
        self.transition(SessionState::Receiving)?;
        info!(participant = %self.id, peer = %self.peer, "session receiving");

        let ended = loop {
            let frame = tokio::select! {
                biased;
                () = self.channel.write_failed() => {
                    break Err(TcpRelayError::Unwritable { peer: self.peer });
                }
                frame = self.lines.next() => frame,
            };
            match frame {
                Some(Ok(line)) => self.handle_line(&line).await,
                Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                    break Err(TcpRelayError::Read {
                        peer: self.peer,
                        detail: "line exceeds the configured maximum length".to_owned(),
                    });
                }
                Some(Err(LinesCodecError::Io(error))) => {
                    break Err(TcpRelayError::Read {
                        peer: self.peer,
                        detail: error.to_string(),
                    });
                }
                None => break Ok(()),
            }
        };

        self.close().await?;
        ended
    }

    /// `Closing -> Closed`，多次调用只生效一次。
    pub async fn close(&mut self) -> Result<(), TcpRelayError> {
        if matches!(self.state, SessionState::Closing | SessionState::Closed) {
            return Ok(());
        }
        self.transition(SessionState::Closing)?;
        let removed = self
            .registration
            .as_ref()
            .is_some_and(Registration::release);
        self.channel.close().await;
        self.transition(SessionState::Closed)?;
        info!(participant = %self.id, peer = %self.peer, removed, "session closed");
        Ok(())
    }

    fn register(&mut self) -> Result<(), TcpRelayError> {
        let previous = self.relay.registry().register(
            self.id.clone(),
            self.channel.clone(),
            TransportKind::Stream,
        );
        if let Some(previous) = previous {
            warn!(participant = %self.id, replaced = ?previous, "registration replaced an existing entry");
        }
        self.registration = Some(Registration {
            relay: self.relay.clone(),
            id: self.id.clone(),
            released: AtomicBool::new(false),
        });
        self.transition(SessionState::Registered)?;
        info!(participant = %self.id, peer = %self.peer, "session registered");
        Ok(())
    }

    async fn handle_line(&self, line: &str) {
        match parse_line(&self.id, line) {
            Ok(InboundLine::Empty) => {}
            Ok(InboundLine::Echo(text)) => self.reply(&format!("Echo: {text}")).await,
            Ok(InboundLine::Route(request)) => {
                let outcome = self.relay.engine().route(&request).await;
                for reply in &outcome.replies {
                    self.reply(reply).await;
                }
            }
            Err(error) => {
                debug!(participant = %self.id, %error, "malformed request");
                self.reply(&format!("[ERROR] {error}")).await;
            }
        }
    }

    async fn reply(&self, text: &str) {
        if let Err(error) = self.channel.send(text).await {
            debug!(participant = %self.id, %error, "reply to sender dropped");
        }
    }

    fn transition(&mut self, next: SessionState) -> Result<(), TcpRelayError> {
        if !self.state.can_transition_to(next) {
            return Err(TcpRelayError::InvalidTransition {
                participant: self.id.clone(),
                from: self.state,
                to: next,
            });
        }
        debug!(participant = %self.id, from = ?self.state, to = ?next, "session transition");
        self.state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_only_moves_forward() {
        use SessionState::*;
        let path = [Connecting, Registered, Receiving, Closing, Closed];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
        assert!(!Receiving.can_transition_to(Registered));
        assert!(!Closed.can_transition_to(Closing));
        assert!(!Closing.can_transition_to(Closing));
    }

    #[test]
    fn early_failure_may_close_before_receiving() {
        assert!(SessionState::Connecting.can_transition_to(SessionState::Closing));
        assert!(SessionState::Registered.can_transition_to(SessionState::Closing));
    }
}
