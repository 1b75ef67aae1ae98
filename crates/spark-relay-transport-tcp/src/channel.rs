use std::{
    net::SocketAddr,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use spark_relay::{DeliveryChannel, DeliveryError, ParticipantId};
use tokio::{
    io::AsyncWriteExt,
    net::tcp::OwnedWriteHalf,
    sync::{Mutex as AsyncMutex, Notify},
    time::timeout,
};
use tracing::debug;

use crate::error::TcpRelayError;

/// 一个 TCP 参与者的出站写通道。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 多个路由调用方可能同时向同一参与者投递，写半部必须串行化，否则两行文本会交错；
/// - 写入受写超时约束，一个不读数据的对端不能无限期占住调用方的执行上下文。
///
/// ## 逻辑 (How)
/// - 内部以 `tokio::sync::Mutex` 包裹 [`OwnedWriteHalf`]，每次 `send` 持锁写完整一行（追加 `\n`）；
/// - 写失败或超时后把 `alive` 置为 `false`：此时字节流可能只写了半行，后续投递直接判定不可达；
///   同时通过 `failed` 通知拥有者会话，由会话自己进入 `Closing` 并注销；
/// - 读半部由 [`ParticipantSession`](crate::ParticipantSession) 独占，本类型从不读取。
///
/// ## 契约 (What)
/// - `send` 可并发调用；失败返回 [`DeliveryError::TransportFailed`]；
/// - [`write_failed`](Self::write_failed) 在首次写失败后完成，失败发生在等待之前也不会丢失；
/// - `close` 幂等，关闭后 `is_alive` 恒为 `false`，写方向只关闭一次。
#[derive(Debug)]
pub struct TcpDeliveryChannel {
    id: ParticipantId,
    peer: SocketAddr,
    writer: AsyncMutex<OwnedWriteHalf>,
    alive: AtomicBool,
    closed: AtomicBool,
    failed: Notify,
    write_timeout: Duration,
}

impl TcpDeliveryChannel {
    pub fn new(
        id: ParticipantId,
        peer: SocketAddr,
        writer: OwnedWriteHalf,
        write_timeout: Duration,
    ) -> Self {
        Self {
            id,
            peer,
            writer: AsyncMutex::new(writer),
            alive: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            failed: Notify::new(),
            write_timeout,
        }
    }

    /// 等待首次写失败。
    pub async fn write_failed(&self) {
        self.failed.notified().await;
    }

    /// 标记不可写并尽力关闭写方向。
    pub async fn close(&self) {
        self.alive.store(false, Ordering::Release);
        if !self.closed.swap(true, Ordering::AcqRel) {
            let mut writer = self.writer.lock().await;
            if let Err(error) = writer.shutdown().await {
                debug!(participant = %self.id, peer = %self.peer, %error, "tcp shutdown after close");
            }
        }
    }

    async fn write_line(&self, text: &str) -> Result<(), TcpRelayError> {
        let mut frame = String::with_capacity(text.len() + 1);
        frame.push_str(text);
        frame.push('\n');

        let mut writer = self.writer.lock().await;
        let write = async {
            writer.write_all(frame.as_bytes()).await?;
            writer.flush().await
        };
        match timeout(self.write_timeout, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(TcpRelayError::Write {
                peer: self.peer,
                source,
            }),
            Err(_) => Err(TcpRelayError::WriteTimeout {
                peer: self.peer,
                timeout: self.write_timeout,
            }),
        }
    }
}

#[async_trait]
impl DeliveryChannel for TcpDeliveryChannel {
    async fn send(&self, text: &str) -> Result<(), DeliveryError> {
        if !self.is_alive() {
            return Err(DeliveryError::transport(self.id.clone(), "connection closed"));
        }
        self.write_line(text).await.map_err(|error| {
            if self.alive.swap(false, Ordering::AcqRel) {
                // 许可会被保存，会话稍后进入等待也能观察到。
                self.failed.notify_one();
            }
            error.into_delivery(self.id.clone())
        })
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }
}
