use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

/// 安装全局 `fmt` 订阅者。
///
/// - **契约 (What)**：`RUST_LOG` 优先；未设置或无法解析时使用配置中的 `fallback` 表达式；
///   重复安装返回错误而不是 panic。
pub fn init(fallback: &str) -> Result<()> {
    let filter = build_env_filter(fallback)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|error| anyhow::anyhow!(error))
        .context("failed to install tracing subscriber")
}

fn build_env_filter(fallback: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(fallback)
            .with_context(|| format!("invalid log level expression `{fallback}`")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_expressions_parse() {
        // 仅在未设置 RUST_LOG 的环境中断言回退路径。
        if std::env::var_os("RUST_LOG").is_none() {
            assert!(build_env_filter("info").is_ok());
            assert!(build_env_filter("spark_relay=debug,warn").is_ok());
        }
    }
}
