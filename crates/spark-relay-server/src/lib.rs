//! # spark-relay-server
//!
//! 服务端装配层：读取 [`RelayConfig`]、初始化日志、绑定 TCP 与 UDP 传输并以对等任务运行。
//! 不包含路由逻辑，全部委托给 `spark-relay`。

pub mod config;
pub mod server;
pub mod telemetry;

pub use config::{ConfigError, RelayConfig};
pub use server::{RelayServer, RunningServer};
