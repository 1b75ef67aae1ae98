//! # 请求行语法：`KIND:arg1[:arg2[:payload]]`
//!
//! ## 核心意图（Why）
//! - 在传输边界把一行文本一次性转换为带标签的 [`RoutingRequest`]，路由引擎对其做穷尽匹配，
//!   不再在各传输里重复做子串判断；
//! - 参与者身份本身包含 `:`（`127.0.0.1:5000:1700000000000`），因此目标段不能简单按 `:` 切分，
//!   需要先识别规范身份形式。
//!
//! ## 语法（What）
//! - `BROADCAST:<payload>`、`ANYCAST:<payload>`；
//! - `UNICAST:<dest>:<payload>`；
//! - `MULTICAST:<dest>[,<dest>...]:<payload>`；
//! - `LISTA`（或 `LISTA:` 后接任意内容，忽略）；
//! - KIND 大小写不敏感；没有可识别 KIND 前缀的文本为 [`InboundLine::Echo`]；空行为 [`InboundLine::Empty`]。
//!
//! ## 目标段识别（How）
//! 1. 以 `[` 开头：IPv6 规范身份 `[ip]:port:millis`；
//! 2. 前三段形如 `IPv4:数字:数字`：IPv4 规范身份；
//! 3. 否则取到第一个 `:` 或 `,` 之前的不透明记号。

use std::{collections::BTreeSet, fmt, net::Ipv4Addr};

use crate::{error::MalformedRequest, participant::ParticipantId};

/// 路由语义。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Unicast,
    Broadcast,
    Anycast,
    Multicast,
    ListQuery,
}

impl RequestKind {
    /// 线上文本使用的大写标签。
    pub fn label(self) -> &'static str {
        match self {
            RequestKind::Unicast => "UNICAST",
            RequestKind::Broadcast => "BROADCAST",
            RequestKind::Anycast => "ANYCAST",
            RequestKind::Multicast => "MULTICAST",
            RequestKind::ListQuery => "LISTA",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        const KINDS: [RequestKind; 5] = [
            RequestKind::Unicast,
            RequestKind::Broadcast,
            RequestKind::Anycast,
            RequestKind::Multicast,
            RequestKind::ListQuery,
        ];
        KINDS
            .into_iter()
            .find(|kind| kind.label().eq_ignore_ascii_case(prefix))
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// 一次路由请求，构造后不可变。
///
/// # 教案式说明
/// - **意图 (Why)**：每种语义只携带它需要的字段，非法组合（例如带负载的 `ListQuery`）无法表示；
/// - **契约 (What)**：`sender` 为发起请求的参与者；`Multicast` 的目标集合去重后按字典序保存。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoutingRequest {
    Unicast {
        sender: ParticipantId,
        destination: ParticipantId,
        payload: String,
    },
    Broadcast {
        sender: ParticipantId,
        payload: String,
    },
    Anycast {
        sender: ParticipantId,
        payload: String,
    },
    Multicast {
        sender: ParticipantId,
        destinations: BTreeSet<ParticipantId>,
        payload: String,
    },
    ListQuery {
        sender: ParticipantId,
    },
}

impl RoutingRequest {
    /// 请求语义。
    pub fn kind(&self) -> RequestKind {
        match self {
            RoutingRequest::Unicast { .. } => RequestKind::Unicast,
            RoutingRequest::Broadcast { .. } => RequestKind::Broadcast,
            RoutingRequest::Anycast { .. } => RequestKind::Anycast,
            RoutingRequest::Multicast { .. } => RequestKind::Multicast,
            RoutingRequest::ListQuery { .. } => RequestKind::ListQuery,
        }
    }
}

/// 一行入站文本的解析结果。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundLine {
    /// 可路由的请求。
    Route(RoutingRequest),
    /// 没有可识别 KIND 前缀的文本；流式传输原样回显，数据报传输丢弃。
    Echo(String),
    /// 去除空白后为空。
    Empty,
}

/// 解析一行入站文本。
///
/// # 教案式注释
/// - **契约 (What)**：
///   - 输入 `line` 可以带有结尾 `\r`/空白，解析前会被修剪；
///   - 返回 `Err` 仅当 KIND 前缀可识别但其余部分不满足语法；
/// - **执行 (How)**：先切出 KIND，再按语义解析目标段与负载段；负载段原样保留，可以包含 `:`。
pub fn parse_line(sender: &ParticipantId, line: &str) -> Result<InboundLine, MalformedRequest> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(InboundLine::Empty);
    }

    let (prefix, rest) = match line.split_once(':') {
        Some((prefix, rest)) => (prefix, Some(rest)),
        None => (line, None),
    };
    let Some(kind) = RequestKind::from_prefix(prefix.trim()) else {
        return Ok(InboundLine::Echo(line.to_owned()));
    };

    let sender = sender.clone();
    let request = match kind {
        RequestKind::ListQuery => RoutingRequest::ListQuery { sender },
        RequestKind::Broadcast => RoutingRequest::Broadcast {
            sender,
            payload: require_payload(kind, rest)?.to_owned(),
        },
        RequestKind::Anycast => RoutingRequest::Anycast {
            sender,
            payload: require_payload(kind, rest)?.to_owned(),
        },
        RequestKind::Unicast => {
            let rest = rest.ok_or(MalformedRequest::MissingDestination { kind: kind.label() })?;
            let (destination, remainder) = take_destination(kind, rest)?;
            if destination.is_empty() {
                return Err(MalformedRequest::MissingDestination { kind: kind.label() });
            }
            let payload = match remainder.strip_prefix(':') {
                Some(payload) => payload,
                None if remainder.is_empty() => {
                    return Err(MalformedRequest::MissingPayload { kind: kind.label() });
                }
                None => {
                    return Err(MalformedRequest::InvalidDestination {
                        kind: kind.label(),
                        fragment: rest.to_owned(),
                    });
                }
            };
            RoutingRequest::Unicast {
                sender,
                destination: ParticipantId::from(destination),
                payload: payload.to_owned(),
            }
        }
        RequestKind::Multicast => {
            let rest = rest.ok_or(MalformedRequest::EmptyDestination { kind: kind.label() })?;
            let (destinations, payload) = take_destination_set(kind, rest)?;
            RoutingRequest::Multicast {
                sender,
                destinations,
                payload: payload.to_owned(),
            }
        }
    };
    Ok(InboundLine::Route(request))
}

fn require_payload(kind: RequestKind, rest: Option<&str>) -> Result<&str, MalformedRequest> {
    rest.ok_or(MalformedRequest::MissingPayload { kind: kind.label() })
}

/// 切出一个目标记号，返回 `(记号, 剩余部分)`；剩余部分以 `,`、`:` 开头或为空。
fn take_destination(kind: RequestKind, input: &str) -> Result<(&str, &str), MalformedRequest> {
    let end = canonical_id_len(input).unwrap_or_else(|| {
        input
            .find([':', ','])
            .unwrap_or(input.len())
    });
    let (token, remainder) = input.split_at(end);
    if !(remainder.is_empty() || remainder.starts_with(':') || remainder.starts_with(',')) {
        return Err(MalformedRequest::InvalidDestination {
            kind: kind.label(),
            fragment: input.to_owned(),
        });
    }
    Ok((token.trim(), remainder))
}

fn take_destination_set(
    kind: RequestKind,
    input: &str,
) -> Result<(BTreeSet<ParticipantId>, &str), MalformedRequest> {
    let mut destinations = BTreeSet::new();
    let mut cursor = input;
    loop {
        let (token, remainder) = take_destination(kind, cursor)?;
        if token.is_empty() {
            return Err(MalformedRequest::EmptyDestination { kind: kind.label() });
        }
        destinations.insert(ParticipantId::from(token));
        if let Some(next) = remainder.strip_prefix(',') {
            cursor = next;
            continue;
        }
        return match remainder.strip_prefix(':') {
            Some(payload) => Ok((destinations, payload)),
            None => Err(MalformedRequest::MissingPayload { kind: kind.label() }),
        };
    }
}

/// 若输入以规范身份开头，返回其字节长度。
fn canonical_id_len(input: &str) -> Option<usize> {
    if input.starts_with('[') {
        // [ipv6]:port:millis
        let close = input.find("]:")?;
        let after = &input[close + 2..];
        let port = digit_run(after)?;
        let stamp = digit_run(after[port..].strip_prefix(':')?)?;
        return Some(close + 2 + port + 1 + stamp);
    }

    let mut segments = input.splitn(4, ':');
    let host = segments.next()?;
    let port = segments.next()?;
    let stamp_segment = segments.next()?;
    host.parse::<Ipv4Addr>().ok()?;
    if digit_run(port)? != port.len() {
        return None;
    }
    let stamp = digit_run(stamp_segment)?;
    Some(host.len() + 1 + port.len() + 1 + stamp)
}

/// 前缀连续 ASCII 数字的长度；没有数字时返回 `None`。
fn digit_run(input: &str) -> Option<usize> {
    let len = input.bytes().take_while(u8::is_ascii_digit).count();
    (len > 0).then_some(len)
}
