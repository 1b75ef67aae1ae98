//! # spark-relay-transport-udp
//!
//! 数据报接入：[`DatagramGateway`] 以单一循环服务全部 UDP 对端，[`OriginTable`] 把来源地址
//! 固定映射到参与者身份，[`UdpDeliveryChannel`] 经共享套接字回源投递。
//!
//! 数据报参与者没有关闭信号，注册后一直保留到进程重启。

mod channel;
mod error;
mod gateway;
mod origin;

pub use channel::UdpDeliveryChannel;
pub use error::UdpRelayError;
pub use gateway::{DatagramGateway, GatewayConfig};
pub use origin::OriginTable;
