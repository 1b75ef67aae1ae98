//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 集中定义路由核心可能出现的两类错误：投递失败（[`DeliveryError`]）与请求行格式错误
//!   （[`MalformedRequest`]）；
//! - 二者都不会终止任何会话：路由引擎在本地把投递失败转换为发给发送者的文字提示，
//!   解析错误则由传输层直接回给发送者。
//!
//! ## 设计要求（What）
//! - 所有错误类型派生 `thiserror::Error`，可以直接交给 `anyhow` 等上层框架；
//! - 变体携带足够的上下文（目标身份、失败细节），便于日志排障。

use thiserror::Error;

use crate::participant::ParticipantId;

/// 单个收件人的投递失败。
///
/// # 教案式说明
/// - **意图 (Why)**：区分“目标不在注册表”与“目标在但写失败”，两者给发送者的提示不同；
/// - **契约 (What)**：
///   - `NotFound` 不会伴随任何 I/O；
///   - `TransportFailed` 不会导致注册表删除该条目，只有拥有者会话可以注销自己；
/// - **风险 (Trade-offs)**：`detail` 使用 `String` 保存底层错误描述，牺牲少量分配换取可读性。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// 目标身份当前未注册。
    #[error("participant `{id}` is not registered")]
    NotFound { id: ParticipantId },

    /// 目标已注册，但通道写入失败、超时或已声明不可达。
    #[error("delivery to `{id}` failed: {detail}")]
    TransportFailed { id: ParticipantId, detail: String },
}

impl DeliveryError {
    /// 构造 `NotFound`。
    pub fn not_found(id: ParticipantId) -> Self {
        DeliveryError::NotFound { id }
    }

    /// 构造 `TransportFailed`。
    pub fn transport(id: ParticipantId, detail: impl Into<String>) -> Self {
        DeliveryError::TransportFailed {
            id,
            detail: detail.into(),
        }
    }

    /// 失败涉及的收件人。
    pub fn participant(&self) -> &ParticipantId {
        match self {
            DeliveryError::NotFound { id } | DeliveryError::TransportFailed { id, .. } => id,
        }
    }

    /// 回给发送者的单行提示。
    pub fn sender_notice(&self) -> String {
        match self {
            DeliveryError::NotFound { id } => format!("[ERROR] destinatario no encontrado: {id}"),
            DeliveryError::TransportFailed { id, .. } => {
                format!("[ERROR] destinatario inalcanzable: {id}")
            }
        }
    }
}

/// 请求行不符合 `KIND:arg1[:arg2[:payload]]` 语法。
///
/// - **意图 (Why)**：解析边界一次性给出结构化原因，路由引擎永远不会见到格式错误的请求；
/// - **契约 (What)**：`Display` 文本即回给发送者的说明（前缀 `[ERROR] ` 由传输层补上）。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MalformedRequest {
    /// 需要负载的请求缺少 `:` 分隔的负载段。
    #[error("{kind} requiere un mensaje")]
    MissingPayload { kind: &'static str },

    /// `UNICAST` 缺少目标段。
    #[error("{kind} requiere un destinatario")]
    MissingDestination { kind: &'static str },

    /// `MULTICAST` 的目标集合为空，或含有空成员（例如 `a,,b`）。
    #[error("{kind} requiere una lista de destinatarios separada por comas")]
    EmptyDestination { kind: &'static str },

    /// 目标段之后既不是 `,` 也不是 `:`，无法切分。
    #[error("destino mal formado en {kind}: `{fragment}`")]
    InvalidDestination {
        kind: &'static str,
        fragment: String,
    },
}
