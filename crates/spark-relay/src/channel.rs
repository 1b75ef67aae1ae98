//! # DeliveryChannel：单个参与者的出站投递抽象
//!
//! ## 核心意图（Why）
//! - 路由引擎只关心“把一行文本交给某个参与者”，不应感知 TCP 写半部或 UDP 回源地址的差异；
//! - 多个调用上下文可能同时向同一参与者投递（会话 A 的广播与会话 B 的单播同时命中 C），
//!   因此 `send` 必须可以并发调用，必要时由实现自行在通道级串行化。
//!
//! ## 契约（What）
//! - `send(text)`：投递一行文本（实现负责追加帧尾，如 TCP 的换行）；失败返回
//!   [`DeliveryError::TransportFailed`]；
//! - `is_alive()`：无阻塞地报告通道自身的存活信号，路由引擎据此跳过已知不可达的目标；
//! - 实现必须 `Send + Sync`，以 `Arc<dyn DeliveryChannel>` 形式存放在注册条目中。

use std::fmt::Debug;

use async_trait::async_trait;

use crate::error::DeliveryError;

/// 参与者出站传输的对象安全抽象。
#[async_trait]
pub trait DeliveryChannel: Debug + Send + Sync {
    /// 向参与者投递一行文本。
    async fn send(&self, text: &str) -> Result<(), DeliveryError>;

    /// 通道是否仍可写。
    fn is_alive(&self) -> bool;
}

#[cfg(any(test, feature = "test-util"))]
pub use memory::MemoryChannel;

#[cfg(any(test, feature = "test-util"))]
mod memory {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::DeliveryChannel;
    use crate::{error::DeliveryError, participant::ParticipantId};

    /// 记录所有投递内容的内存通道，供路由测试使用。
    ///
    /// # 教案式说明
    /// - **意图 (Why)**：在不打开套接字的前提下复现“成功 / 写失败 / 已断开”三种目标状态；
    /// - **契约 (What)**：
    ///   - `fail_sends(true)` 后每次 `send` 都计一次尝试并返回 `TransportFailed`；
    ///   - `disconnect()` 让 `is_alive` 返回 `false`，路由引擎不会再对其发起 I/O；
    ///   - `attempts()` 统计包括失败在内的全部 `send` 调用次数。
    #[derive(Debug)]
    pub struct MemoryChannel {
        id: ParticipantId,
        delivered: Mutex<Vec<String>>,
        attempts: AtomicUsize,
        failing: AtomicBool,
        alive: AtomicBool,
    }

    impl MemoryChannel {
        /// 创建一个总是成功的通道。
        pub fn new(id: impl Into<ParticipantId>) -> Self {
            Self {
                id: id.into(),
                delivered: Mutex::new(Vec::new()),
                attempts: AtomicUsize::new(0),
                failing: AtomicBool::new(false),
                alive: AtomicBool::new(true),
            }
        }

        /// 切换写失败模式。
        pub fn fail_sends(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        /// 模拟连接已断开。
        pub fn disconnect(&self) {
            self.alive.store(false, Ordering::SeqCst);
        }

        /// 已成功投递的文本副本。
        pub fn delivered(&self) -> Vec<String> {
            self.delivered.lock().clone()
        }

        /// `send` 被调用的总次数。
        pub fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DeliveryChannel for MemoryChannel {
        async fn send(&self, text: &str) -> Result<(), DeliveryError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(DeliveryError::transport(
                    self.id.clone(),
                    "simulated write failure",
                ));
            }
            self.delivered.lock().push(text.to_owned());
            Ok(())
        }

        fn is_alive(&self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }
    }
}
