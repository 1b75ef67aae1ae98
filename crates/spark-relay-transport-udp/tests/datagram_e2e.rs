//! 回环 UDP 套接字上的数据报网关场景。

use std::{net::SocketAddr, time::Duration};

use spark_relay::Relay;
use spark_relay_transport_udp::{DatagramGateway, GatewayConfig};
use tokio::{net::UdpSocket, time::timeout};

const WAIT: Duration = Duration::from_secs(5);

struct Peer {
    socket: UdpSocket,
    server: SocketAddr,
}

impl Peer {
    async fn new(server: SocketAddr) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.expect("bind client");
        Self { socket, server }
    }

    async fn send(&self, text: &str) {
        self.socket
            .send_to(text.as_bytes(), self.server)
            .await
            .expect("send");
    }

    async fn recv(&self) -> String {
        let mut buffer = [0_u8; 2048];
        let (len, _) = timeout(WAIT, self.socket.recv_from(&mut buffer))
            .await
            .expect("timed out waiting for a datagram")
            .expect("recv");
        String::from_utf8_lossy(&buffer[..len]).into_owned()
    }

    /// 发送 `LISTA` 完成首次注册，并从回复中取出自己的身份。
    async fn join(&self) -> String {
        self.send("LISTA").await;
        let listing = self.recv().await;
        own_id(&listing)
    }
}

fn own_id(listing: &str) -> String {
    let (_, members) = listing
        .split_once("participantes: ")
        .unwrap_or_else(|| panic!("unexpected listing: {listing}"));
    members
        .split(", ")
        .find_map(|member| member.strip_suffix(" (tu)"))
        .unwrap_or_else(|| panic!("listing does not mark the sender: {listing}"))
        .to_owned()
}

async fn start() -> (Relay, SocketAddr) {
    let relay = Relay::new();
    let gateway = DatagramGateway::bind(
        "127.0.0.1:0".parse().expect("addr"),
        relay.clone(),
        GatewayConfig::default(),
    )
    .await
    .expect("bind gateway");
    let addr = gateway.local_addr();
    tokio::spawn(gateway.run());
    (relay, addr)
}

/// 首个数据报即完成注册，同一来源后续数据报沿用同一身份。
#[tokio::test(flavor = "multi_thread")]
async fn first_datagram_registers_and_origin_stays_pinned() {
    let (relay, addr) = start().await;
    let peer = Peer::new(addr).await;

    let first = peer.join().await;
    let local = peer.socket.local_addr().expect("local addr");
    assert!(first.starts_with(&format!("{local}:")), "id {first} should derive from {local}");

    let second = peer.join().await;
    assert_eq!(first, second);
    assert_eq!(relay.participant_counts(), (0, 1));
}

#[tokio::test(flavor = "multi_thread")]
async fn unicast_between_datagram_participants() {
    let (relay, addr) = start().await;
    let u1 = Peer::new(addr).await;
    let u2 = Peer::new(addr).await;
    let u1_id = u1.join().await;
    let u2_id = u2.join().await;

    u1.send(&format!("UNICAST:{u2_id}:hola")).await;
    assert_eq!(u2.recv().await, format!("[UNICAST de {u1_id}] hola"));
    assert_eq!(u1.recv().await, format!("[UNICAST] entregado a {u2_id}"));
    assert_eq!(relay.total_routed_messages(), 1);
}

/// 数据报上没有回显：无前缀文本被丢弃，下一条回复属于后续请求。
#[tokio::test(flavor = "multi_thread")]
async fn unprefixed_datagram_is_dropped_without_reply() {
    let (_relay, addr) = start().await;
    let peer = Peer::new(addr).await;

    peer.send("hola servidor").await;
    peer.send("LISTA").await;
    let reply = peer.recv().await;
    assert!(reply.starts_with("[LISTA] 1 participantes: "), "got {reply}");
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_request_is_answered_with_error() {
    let (_relay, addr) = start().await;
    let peer = Peer::new(addr).await;

    peer.send("MULTICAST:").await;
    assert_eq!(
        peer.recv().await,
        "[ERROR] MULTICAST requiere una lista de destinatarios separada por comas"
    );
}

/// 组播：已注册成员收到，未知成员逐个报错。
#[tokio::test(flavor = "multi_thread")]
async fn multicast_reports_unknown_members() {
    let (_relay, addr) = start().await;
    let u1 = Peer::new(addr).await;
    let u2 = Peer::new(addr).await;
    let u1_id = u1.join().await;
    let u2_id = u2.join().await;

    u1.send(&format!("MULTICAST:{u2_id},ghost:reunion")).await;
    assert_eq!(u2.recv().await, format!("[MULTICAST de {u1_id}] reunion"));
    assert_eq!(u1.recv().await, format!("[MULTICAST] entregado a {u2_id}"));
    assert_eq!(u1.recv().await, "[ERROR] destinatario no encontrado: ghost");
}
