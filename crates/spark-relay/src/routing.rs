//! # RoutingEngine：四种投递语义的决策与执行
//!
//! ## 核心意图（Why）
//! - 给定一个 [`RoutingRequest`] 与注册表的当前快照，决定收件人集合并发起投递；
//! - 路由在调用方（会话或数据报网关）的执行上下文中同步完成，只在读取注册表时短暂加锁，
//!   投递 I/O 一律发生在锁外。
//!
//! ## 语义（What）
//! - **Unicast**：查找目标；缺失或写失败时回给发送者错误提示，否则恰好一次投递；
//! - **Broadcast**：对快照中除发送者外的每个条目尽力投递，部分失败只记录、不中止，也不提示发送者；
//! - **Anycast**：按快照（注册）顺序逐个尝试，首个成功即停止；全部失败时提示“无可用收件人”；
//! - **Multicast**：对集合中每个已注册身份尽力投递，未注册的身份逐个以 `NotFound` 报告；
//! - **ListQuery**：只把当前身份列表回给发送者，并标记发送者自身。
//!
//! ## 风险提示（Trade-offs）
//! - 引擎从不修改注册表：`TransportFailed` 不会注销目标，只有拥有者会话能注销自己；
//! - Anycast 的选择是确定性的快照顺序，不具备公平性或随机性。

use std::{
    collections::BTreeSet,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use futures::future::join_all;
use tracing::{debug, warn};

use crate::{
    error::DeliveryError,
    participant::{ParticipantEntry, ParticipantId},
    registry::ParticipantRegistry,
    request::{RequestKind, RoutingRequest},
};

/// 单个收件人的投递结果。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecipientOutcome {
    pub recipient: ParticipantId,
    pub result: Result<(), DeliveryError>,
}

impl RecipientOutcome {
    fn new(recipient: ParticipantId, result: Result<(), DeliveryError>) -> Self {
        Self { recipient, result }
    }

    /// 是否投递成功。
    pub fn is_delivered(&self) -> bool {
        self.result.is_ok()
    }
}

/// 一次路由的完整记录。
///
/// # 教案式说明
/// - **意图 (Why)**：测试与调用方都需要知道“尝试了谁、结果如何、要回给发送者什么”；
/// - **契约 (What)**：
///   - `outcomes` 按尝试顺序排列；`NotFound` 也会出现在其中，但不对应任何 I/O；
///   - `replies` 为需要回给发送者的单行文本，由调用方经发送者自己的通道送出。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutingOutcome {
    pub kind: RequestKind,
    pub outcomes: Vec<RecipientOutcome>,
    pub replies: Vec<String>,
}

impl RoutingOutcome {
    fn new(kind: RequestKind) -> Self {
        Self {
            kind,
            outcomes: Vec::new(),
            replies: Vec::new(),
        }
    }

    /// 成功投递的收件人，按尝试顺序。
    pub fn delivered(&self) -> impl Iterator<Item = &ParticipantId> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.is_delivered())
            .map(|outcome| &outcome.recipient)
    }

    /// 失败记录，按尝试顺序。
    pub fn failures(&self) -> impl Iterator<Item = &DeliveryError> {
        self.outcomes
            .iter()
            .filter_map(|outcome| outcome.result.as_ref().err())
    }

    /// 成功投递次数。
    pub fn delivered_count(&self) -> usize {
        self.delivered().count()
    }
}

/// 路由引擎。
///
/// # 教案式注释
/// - **意图 (Why)**：持有注册表的共享引用与全局投递计数，任意调用上下文都可以并发调用 [`route`](Self::route)；
/// - **契约 (What)**：`route` 只读注册表、只经 [`DeliveryChannel`](crate::DeliveryChannel) 写出；
///   计数器在每次成功投递（而非每个请求）后加一，单调递增；
/// - **风险 (Trade-offs)**：广播与组播并发等待各收件人的写入，总耗时受最慢收件人（及其写超时）约束。
#[derive(Debug)]
pub struct RoutingEngine {
    registry: Arc<ParticipantRegistry>,
    routed: AtomicU64,
}

impl RoutingEngine {
    /// 以共享注册表构造引擎。
    pub fn new(registry: Arc<ParticipantRegistry>) -> Self {
        Self {
            registry,
            routed: AtomicU64::new(0),
        }
    }

    /// 累计成功投递次数。
    pub fn total_routed_messages(&self) -> u64 {
        self.routed.load(Ordering::Relaxed)
    }

    /// 执行一次路由。
    pub async fn route(&self, request: &RoutingRequest) -> RoutingOutcome {
        match request {
            RoutingRequest::Unicast {
                sender,
                destination,
                payload,
            } => self.unicast(sender, destination, payload).await,
            RoutingRequest::Broadcast { sender, payload } => self.broadcast(sender, payload).await,
            RoutingRequest::Anycast { sender, payload } => self.anycast(sender, payload).await,
            RoutingRequest::Multicast {
                sender,
                destinations,
                payload,
            } => self.multicast(sender, destinations, payload).await,
            RoutingRequest::ListQuery { sender } => self.list(sender),
        }
    }

    async fn unicast(
        &self,
        sender: &ParticipantId,
        destination: &ParticipantId,
        payload: &str,
    ) -> RoutingOutcome {
        let kind = RequestKind::Unicast;
        let mut outcome = RoutingOutcome::new(kind);
        let result = match self.registry.lookup(destination.as_str()) {
            Some(entry) => {
                let text = render_delivery(kind, sender, payload);
                self.deliver(kind, sender, &entry, &text).await
            }
            None => {
                let error = DeliveryError::not_found(destination.clone());
                log_failure(kind, sender, &error);
                Err(error)
            }
        };
        match &result {
            Ok(()) => outcome
                .replies
                .push(format!("[{kind}] entregado a {destination}")),
            Err(error) => outcome.replies.push(error.sender_notice()),
        }
        outcome
            .outcomes
            .push(RecipientOutcome::new(destination.clone(), result));
        outcome
    }

    async fn broadcast(&self, sender: &ParticipantId, payload: &str) -> RoutingOutcome {
        let kind = RequestKind::Broadcast;
        let text = render_delivery(kind, sender, payload);
        let recipients: Vec<ParticipantEntry> = self
            .registry
            .snapshot()
            .into_iter()
            .filter(|entry| &entry.id != sender)
            .collect();

        let results = join_all(
            recipients
                .iter()
                .map(|entry| self.deliver(kind, sender, entry, &text)),
        )
        .await;

        let mut outcome = RoutingOutcome::new(kind);
        outcome.outcomes = recipients
            .into_iter()
            .zip(results)
            .map(|(entry, result)| RecipientOutcome::new(entry.id, result))
            .collect();
        outcome
    }

    async fn anycast(&self, sender: &ParticipantId, payload: &str) -> RoutingOutcome {
        let kind = RequestKind::Anycast;
        let text = render_delivery(kind, sender, payload);
        let mut outcome = RoutingOutcome::new(kind);

        for entry in self.registry.snapshot() {
            if &entry.id == sender {
                continue;
            }
            let result = self.deliver(kind, sender, &entry, &text).await;
            let delivered = result.is_ok();
            outcome
                .outcomes
                .push(RecipientOutcome::new(entry.id.clone(), result));
            if delivered {
                outcome
                    .replies
                    .push(format!("[{kind}] entregado a {}", entry.id));
                return outcome;
            }
        }

        warn!(sender = %sender, kind = %kind, probes = outcome.outcomes.len(), "anycast found no available recipient");
        outcome
            .replies
            .push("[ERROR] ningun destinatario disponible".to_owned());
        outcome
    }

    async fn multicast(
        &self,
        sender: &ParticipantId,
        destinations: &BTreeSet<ParticipantId>,
        payload: &str,
    ) -> RoutingOutcome {
        let kind = RequestKind::Multicast;
        let text = render_delivery(kind, sender, payload);
        let resolved: Vec<(ParticipantId, Option<ParticipantEntry>)> = destinations
            .iter()
            .map(|id| (id.clone(), self.registry.lookup(id.as_str())))
            .collect();

        let text = text.as_str();
        let results = join_all(resolved.iter().map(|(id, entry)| async move {
            match entry {
                Some(entry) => self.deliver(kind, sender, entry, text).await,
                None => {
                    let error = DeliveryError::not_found(id.clone());
                    log_failure(kind, sender, &error);
                    Err(error)
                }
            }
        }))
        .await;

        let mut outcome = RoutingOutcome::new(kind);
        outcome.outcomes = resolved
            .into_iter()
            .zip(results)
            .map(|((id, _), result)| RecipientOutcome::new(id, result))
            .collect();

        let delivered: Vec<&str> = outcome.delivered().map(ParticipantId::as_str).collect();
        let mut replies = Vec::new();
        if !delivered.is_empty() {
            replies.push(format!("[{kind}] entregado a {}", delivered.join(", ")));
        }
        replies.extend(outcome.failures().map(DeliveryError::sender_notice));
        outcome.replies = replies;
        outcome
    }

    fn list(&self, sender: &ParticipantId) -> RoutingOutcome {
        let summaries = self.registry.summaries();
        let listed: Vec<String> = summaries
            .iter()
            .map(|summary| {
                if &summary.id == sender {
                    format!("{} (tu)", summary.id)
                } else {
                    summary.id.to_string()
                }
            })
            .collect();

        let mut outcome = RoutingOutcome::new(RequestKind::ListQuery);
        outcome.replies.push(format!(
            "[LISTA] {} participantes: {}",
            listed.len(),
            listed.join(", ")
        ));
        outcome
    }

    /// 对单个条目发起一次投递尝试。
    ///
    /// - **契约 (What)**：条目不可达时直接返回 `TransportFailed`，不产生 I/O；
    ///   成功时递增全局计数；每次尝试都会带着发送者、收件人与结果写日志。
    async fn deliver(
        &self,
        kind: RequestKind,
        sender: &ParticipantId,
        entry: &ParticipantEntry,
        text: &str,
    ) -> Result<(), DeliveryError> {
        let result = if entry.is_reachable() {
            entry.channel.send(text).await
        } else {
            Err(DeliveryError::transport(
                entry.id.clone(),
                "participant is closing",
            ))
        };

        match &result {
            Ok(()) => {
                self.routed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    sender = %sender,
                    recipient = %entry.id,
                    transport = %entry.transport,
                    kind = %kind,
                    outcome = "delivered",
                    "delivery attempt"
                );
            }
            Err(error) => log_failure(kind, sender, error),
        }
        result
    }
}

fn render_delivery(kind: RequestKind, sender: &ParticipantId, payload: &str) -> String {
    format!("[{kind} de {sender}] {payload}")
}

fn log_failure(kind: RequestKind, sender: &ParticipantId, error: &DeliveryError) {
    let outcome = match error {
        DeliveryError::NotFound { .. } => "not_found",
        DeliveryError::TransportFailed { .. } => "transport_failed",
    };
    warn!(
        sender = %sender,
        recipient = %error.participant(),
        kind = %kind,
        outcome,
        error = %error,
        "delivery attempt"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{channel::MemoryChannel, participant::TransportKind};
    use tracing_test::traced_test;

    struct Fixture {
        registry: Arc<ParticipantRegistry>,
        engine: RoutingEngine,
    }

    impl Fixture {
        fn new() -> Self {
            let registry = Arc::new(ParticipantRegistry::new());
            let engine = RoutingEngine::new(Arc::clone(&registry));
            Self { registry, engine }
        }

        fn join(&self, id: &str) -> Arc<MemoryChannel> {
            let channel = Arc::new(MemoryChannel::new(id));
            self.registry
                .register(id.into(), channel.clone(), TransportKind::Stream);
            channel
        }
    }

    #[tokio::test]
    async fn unicast_delivers_once_and_confirms() {
        let fx = Fixture::new();
        let a = fx.join("A");
        let b = fx.join("B");
        let c = fx.join("C");

        let outcome = fx
            .engine
            .route(&RoutingRequest::Unicast {
                sender: "A".into(),
                destination: "B".into(),
                payload: "hi".into(),
            })
            .await;

        assert_eq!(b.delivered(), ["[UNICAST de A] hi"]);
        assert!(a.delivered().is_empty());
        assert!(c.delivered().is_empty());
        assert_eq!(outcome.replies, ["[UNICAST] entregado a B"]);
        assert_eq!(fx.engine.total_routed_messages(), 1);
    }

    /// 未注册目标：零次 I/O、一条 `NotFound` 记录，并以 warn 级别留下日志。
    #[tokio::test]
    #[traced_test]
    async fn unicast_to_unknown_id_is_logged_and_reported() {
        let fx = Fixture::new();
        let a = fx.join("A");

        let outcome = fx
            .engine
            .route(&RoutingRequest::Unicast {
                sender: "A".into(),
                destination: "Z".into(),
                payload: "hi".into(),
            })
            .await;

        assert_eq!(outcome.replies, ["[ERROR] destinatario no encontrado: Z"]);
        assert_eq!(
            outcome.outcomes,
            [RecipientOutcome::new(
                "Z".into(),
                Err(DeliveryError::not_found("Z".into()))
            )]
        );
        assert_eq!(a.attempts(), 0);
        assert!(logs_contain("not_found"));
    }

    #[tokio::test]
    async fn unicast_to_failing_channel_reports_unreachable_and_keeps_entry() {
        let fx = Fixture::new();
        fx.join("A");
        let b = fx.join("B");
        b.fail_sends(true);

        let outcome = fx
            .engine
            .route(&RoutingRequest::Unicast {
                sender: "A".into(),
                destination: "B".into(),
                payload: "hi".into(),
            })
            .await;

        assert_eq!(b.attempts(), 1);
        assert_eq!(outcome.replies, ["[ERROR] destinatario inalcanzable: B"]);
        assert!(fx.registry.contains("B"), "routing must never deregister");
        assert_eq!(fx.engine.total_routed_messages(), 0);
    }

    #[tokio::test]
    async fn anycast_skips_closing_entries_without_io() {
        let fx = Fixture::new();
        fx.join("A");
        let b = fx.join("B");
        let c = fx.join("C");
        fx.registry.set_alive("B", false);

        let outcome = fx
            .engine
            .route(&RoutingRequest::Anycast {
                sender: "A".into(),
                payload: "ping".into(),
            })
            .await;

        assert_eq!(b.attempts(), 0);
        assert_eq!(c.delivered(), ["[ANYCAST de A] ping"]);
        assert_eq!(outcome.outcomes.len(), 2);
        assert_eq!(outcome.replies, ["[ANYCAST] entregado a C"]);
    }

    #[tokio::test]
    async fn list_query_marks_sender_and_delivers_nothing() {
        let fx = Fixture::new();
        let a = fx.join("A");
        let b = fx.join("B");

        let outcome = fx
            .engine
            .route(&RoutingRequest::ListQuery { sender: "B".into() })
            .await;

        assert_eq!(outcome.replies, ["[LISTA] 2 participantes: A, B (tu)"]);
        assert!(outcome.outcomes.is_empty());
        assert_eq!(a.attempts() + b.attempts(), 0);
    }

    #[tokio::test]
    async fn broadcast_is_silent_to_sender_even_on_failures() {
        let fx = Fixture::new();
        let a = fx.join("A");
        let b = fx.join("B");
        b.fail_sends(true);

        let outcome = fx
            .engine
            .route(&RoutingRequest::Broadcast {
                sender: "A".into(),
                payload: "hola".into(),
            })
            .await;

        assert!(outcome.replies.is_empty());
        assert_eq!(outcome.failures().count(), 1);
        assert_eq!(a.attempts(), 0);
    }
}
