//! # 服务端配置
//!
//! ## 意图（Why）
//! - 把监听地址、分帧上限、写超时与日志级别集中在一个可由 TOML 文件描述的结构中，
//!   命令行参数只做少量覆盖；
//! - 缺省值沿用中继一贯的端口：TCP `12345`、UDP `12346`。
//!
//! ## 契约（What）
//! - 文件中缺失的字段取默认值（`#[serde(default)]`），未知字段视为错误，避免拼写错误被静默忽略；
//! - [`RelayConfig::validate`] 拒绝为零的尺寸与超时，无效配置在启动阶段即失败。

use std::{
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use spark_relay_transport_tcp::SessionConfig;
use spark_relay_transport_udp::GatewayConfig;
use thiserror::Error;

/// 配置加载与校验错误。
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 配置文件无法读取。
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML 语法或字段类型错误。
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// 字段取值非法。
    #[error("invalid config field `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

/// 中继服务端配置。
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelayConfig {
    /// 流式传输监听地址。
    pub tcp_bind: SocketAddr,
    /// 数据报传输监听地址。
    pub udp_bind: SocketAddr,
    /// 单行最大字节数。
    pub max_line_length: usize,
    /// 最大数据报字节数。
    pub max_datagram_size: usize,
    /// 投递写超时（毫秒）。
    pub write_timeout_ms: u64,
    /// `RUST_LOG` 未设置时使用的日志过滤表达式。
    pub log_level: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            tcp_bind: SocketAddr::from(([0, 0, 0, 0], 12345)),
            udp_bind: SocketAddr::from(([0, 0, 0, 0], 12346)),
            max_line_length: 4096,
            max_datagram_size: 1024,
            write_timeout_ms: 2000,
            log_level: "info".to_owned(),
        }
    }
}

impl RelayConfig {
    /// 从可选的文件路径加载；未给出路径时返回默认配置。两种情况都会经过校验。
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml_str(&raw)?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// 解析 TOML 文本（不校验）。
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_line_length == 0 {
            return Err(ConfigError::Invalid {
                field: "max_line_length",
                reason: "must be greater than zero",
            });
        }
        if self.max_datagram_size == 0 {
            return Err(ConfigError::Invalid {
                field: "max_datagram_size",
                reason: "must be greater than zero",
            });
        }
        if self.write_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "write_timeout_ms",
                reason: "must be greater than zero",
            });
        }
        if self.log_level.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "log_level",
                reason: "must not be empty",
            });
        }
        Ok(())
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// 流式会话配置。
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            max_line_length: self.max_line_length,
            write_timeout: self.write_timeout(),
        }
    }

    /// 数据报网关配置。
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            max_datagram_size: self.max_datagram_size,
            write_timeout: self.write_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_ports_and_limits() {
        let config = RelayConfig::load(None).expect("defaults are valid");
        assert_eq!(config.tcp_bind.port(), 12345);
        assert_eq!(config.udp_bind.port(), 12346);
        assert_eq!(config.session_config().max_line_length, 4096);
        assert_eq!(config.gateway_config().max_datagram_size, 1024);
        assert_eq!(config.write_timeout(), Duration::from_secs(2));
        assert_eq!(config.log_level, "info");
    }

    /// 文件只写部分字段时，其余字段取默认值。
    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let config = RelayConfig::from_toml_str(
            r#"
            tcp_bind = "127.0.0.1:7000"
            log_level = "spark_relay=debug"
            "#,
        )
        .expect("parse");
        assert_eq!(config.tcp_bind, "127.0.0.1:7000".parse().expect("addr"));
        assert_eq!(config.udp_bind.port(), 12346);
        assert_eq!(config.log_level, "spark_relay=debug");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let error = RelayConfig::from_toml_str("tcp_port = 1").expect_err("unknown field");
        assert!(matches!(error, ConfigError::Parse(_)));
    }

    #[test]
    fn zero_sizes_fail_validation() {
        let config = RelayConfig::from_toml_str("max_line_length = 0").expect("parse");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "max_line_length",
                ..
            })
        ));

        let config = RelayConfig::from_toml_str("write_timeout_ms = 0").expect("parse");
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let error = RelayConfig::load(Some(Path::new("/nonexistent/spark-relay.toml")))
            .expect_err("missing file");
        assert!(matches!(error, ConfigError::Read { .. }));
    }
}
