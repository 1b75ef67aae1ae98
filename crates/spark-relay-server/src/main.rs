use std::{net::SocketAddr, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use spark_relay_server::{RelayConfig, RelayServer, telemetry};
use tracing::info;

/// 双传输聊天中继。
#[derive(Debug, Parser)]
#[command(name = "spark-relay", version, about, long_about = None)]
struct Cli {
    /// TOML 配置文件路径；缺省时使用内置默认值。
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 覆盖流式监听地址。
    #[arg(long)]
    tcp_bind: Option<SocketAddr>,

    /// 覆盖数据报监听地址。
    #[arg(long)]
    udp_bind: Option<SocketAddr>,

    /// 覆盖日志过滤表达式（`RUST_LOG` 仍然优先）。
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn into_config(self) -> Result<RelayConfig> {
        let mut config = RelayConfig::load(self.config.as_deref())?;
        if let Some(addr) = self.tcp_bind {
            config.tcp_bind = addr;
        }
        if let Some(addr) = self.udp_bind {
            config.udp_bind = addr;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Cli::parse().into_config()?;
    telemetry::init(&config.log_level)?;

    let server = RelayServer::bind(&config).await?;
    info!(
        tcp = %server.tcp_addr(),
        udp = %server.udp_addr(),
        max_line_length = config.max_line_length,
        max_datagram_size = config.max_datagram_size,
        write_timeout_ms = config.write_timeout_ms,
        "spark-relay listening"
    );
    let running = server.spawn();

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutdown requested");
    running.log_status();
    running.shutdown();
    Ok(())
}
