//! # config 模块说明
//!
//! ## 设计定位（Why）
//! - 服务节点启动所需的全部参数：对外地址、命名节点地址、服务类型、日志级别与各类时限；
//! - 来源按优先级叠加：命令行参数 > TOML 配置文件 > 内置默认值；命名节点地址三者皆无时回退到
//!   `NODE_LOOKUP` 环境变量（逗号分隔）。
//!
//! ## 校验规则（What）
//! - 每个地址必须能拆成 `host:port`，host 非空且不是 `0.0.0.0`，port 为合法端口号；
//! - 至少一个命名节点地址；服务类型非空。
//!
//! ## TLS（What）
//! - `scheme = "https"` 时管理面以 TLS 提供服务，证书链与私钥默认取
//!   `$HOME/etc/pem/server.crt` 与 `$HOME/etc/pem/server.key`。

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use clap::Parser;
use lookup_client::DiscoverySettings;
use lookup_core::Scheme;
use serde::Deserialize;

use crate::{error::ConfigError, shutdown::ShutdownPolicy};

/// 命名节点地址的环境变量。
pub const LOOKUP_ENV: &str = "NODE_LOOKUP";

/// `lookup-node` 命令行参数。
#[derive(Debug, Default, Parser)]
#[command(name = "lookup-node", version, about = "Service node with lookup registration")]
pub struct Cli {
    /// TOML 配置文件路径。
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 对外暴露的 `host:port`。
    #[arg(long)]
    pub host: Option<String>,

    /// 命名节点地址，可重复或以逗号分隔。
    #[arg(long, value_delimiter = ',')]
    pub lookup: Vec<String>,

    /// 监听 `0.0.0.0:<port>` 而非 `host`。
    #[arg(long)]
    pub bind_any: bool,

    #[arg(long)]
    pub node_type: Option<String>,

    /// `http` 或 `https`。
    #[arg(long)]
    pub scheme: Option<String>,

    /// 数值日志级别：0 error .. 5 trace。
    #[arg(long)]
    pub log_level: Option<i64>,

    #[arg(long)]
    pub stack_dump_dir: Option<PathBuf>,

    /// PEM 证书链，仅 `https` 时使用。
    #[arg(long)]
    pub tls_cert: Option<PathBuf>,

    /// PEM 私钥，仅 `https` 时使用。
    #[arg(long)]
    pub tls_key: Option<PathBuf>,
}

/// 节点配置。
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeConfig {
    pub host: String,
    pub lookup: Vec<String>,
    pub bind_any: bool,
    pub node_type: String,
    pub scheme: Scheme,
    pub log_level: i64,
    pub refresh_interval_ms: u64,
    pub dirty_queue_capacity: usize,
    pub shutdown_timeout_ms: u64,
    pub shutdown_min_dwell_ms: u64,
    pub stack_dump_dir: PathBuf,
    pub tls_cert: PathBuf,
    pub tls_key: PathBuf,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            lookup: Vec::new(),
            bind_any: false,
            node_type: String::new(),
            scheme: Scheme::Http,
            log_level: 3,
            refresh_interval_ms: 1_000,
            dirty_queue_capacity: 1_024,
            shutdown_timeout_ms: 2_000,
            shutdown_min_dwell_ms: 1_000,
            stack_dump_dir: PathBuf::from("."),
            tls_cert: default_pem_dir().join("server.crt"),
            tls_key: default_pem_dir().join("server.key"),
        }
    }
}

impl NodeConfig {
    pub fn from_toml_str(source: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(source).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let source = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source, path)
    }

    /// 读取配置文件（若有）、叠加命令行、回退环境变量并校验。
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let base = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let config = base
            .merge_cli(cli)
            .with_lookup_fallback(std::env::var(LOOKUP_ENV).ok().as_deref());
        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn merge_cli(mut self, cli: &Cli) -> Self {
        if let Some(host) = &cli.host {
            self.host.clone_from(host);
        }
        if !cli.lookup.is_empty() {
            self.lookup.clone_from(&cli.lookup);
        }
        self.bind_any |= cli.bind_any;
        if let Some(node_type) = &cli.node_type {
            self.node_type.clone_from(node_type);
        }
        if let Some(scheme) = &cli.scheme {
            self.scheme = Scheme::from(scheme.as_str());
        }
        if let Some(level) = cli.log_level {
            self.log_level = level;
        }
        if let Some(dir) = &cli.stack_dump_dir {
            self.stack_dump_dir.clone_from(dir);
        }
        if let Some(cert) = &cli.tls_cert {
            self.tls_cert.clone_from(cert);
        }
        if let Some(key) = &cli.tls_key {
            self.tls_key.clone_from(key);
        }
        self
    }

    /// 未配置命名节点地址时使用环境变量的值。
    #[must_use]
    pub fn with_lookup_fallback(mut self, env_value: Option<&str>) -> Self {
        if self.lookup.is_empty()
            && let Some(value) = env_value
        {
            self.lookup = value
                .split(',')
                .map(str::trim)
                .filter(|addr| !addr.is_empty())
                .map(str::to_owned)
                .collect();
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        host_check(&self.host)?;
        if self.node_type.trim().is_empty() {
            return Err(ConfigError::MissingNodeType);
        }
        if self.lookup.is_empty() {
            return Err(ConfigError::MissingLookup);
        }
        self.lookup.iter().try_for_each(|addr| host_check(addr))
    }

    /// 由对外地址派生的标识符：去掉 `.`，`:` 换成 `_`。
    #[must_use]
    pub fn identifier(&self) -> String {
        self.host.replace('.', "").replace(':', "_")
    }

    /// 管理面监听地址。
    #[must_use]
    pub fn bind_address(&self) -> String {
        match (self.bind_any, self.host.rsplit_once(':')) {
            (true, Some((_, port))) => format!("0.0.0.0:{port}"),
            _ => self.host.clone(),
        }
    }

    #[must_use]
    pub fn discovery_settings(&self) -> DiscoverySettings {
        DiscoverySettings {
            refresh_interval: Duration::from_millis(self.refresh_interval_ms.max(1)),
            dirty_queue_capacity: self.dirty_queue_capacity.max(1),
        }
    }

    #[must_use]
    pub fn shutdown_policy(&self) -> ShutdownPolicy {
        ShutdownPolicy {
            timeout: Duration::from_millis(self.shutdown_timeout_ms),
            min_dwell: Duration::from_millis(self.shutdown_min_dwell_ms),
        }
    }
}

fn default_pem_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_default()
        .join("etc")
        .join("pem")
}

/// 校验 `host:port` 形式的可对外访问地址。
pub fn host_check(addr: &str) -> Result<(), ConfigError> {
    let invalid = |reason| ConfigError::InvalidAddress {
        addr: addr.to_owned(),
        reason,
    };
    let (host, port) = addr.rsplit_once(':').ok_or_else(|| invalid("missing port"))?;
    if host.is_empty() {
        return Err(invalid("empty host"));
    }
    if host == "0.0.0.0" {
        return Err(invalid("unspecified host is not reachable"));
    }
    if port.is_empty() {
        return Err(invalid("empty port"));
    }
    port.parse::<u16>()
        .map(|_| ())
        .map_err(|_| invalid("port is not a number in 0..=65535"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> NodeConfig {
        NodeConfig {
            host: "10.1.2.3:9000".to_owned(),
            lookup: vec!["10.0.0.1:7000".to_owned()],
            node_type: "worker".to_owned(),
            ..NodeConfig::default()
        }
    }

    #[test]
    fn host_check_rejects_unreachable_addresses() {
        assert!(host_check("10.1.2.3:9000").is_ok());
        for bad in ["10.1.2.3", ":9000", "0.0.0.0:9000", "10.1.2.3:", "10.1.2.3:http"] {
            assert!(
                matches!(host_check(bad), Err(ConfigError::InvalidAddress { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn identifier_and_bind_address_derive_from_host() {
        let mut config = valid();
        assert_eq!(config.identifier(), "10123_9000");
        assert_eq!(config.bind_address(), "10.1.2.3:9000");
        config.bind_any = true;
        assert_eq!(config.bind_address(), "0.0.0.0:9000");
    }

    #[test]
    fn toml_file_fills_missing_fields_with_defaults() {
        let config = NodeConfig::from_toml_str(
            r#"
                host = "10.1.2.3:9000"
                lookup = ["10.0.0.1:7000", "10.0.0.2:7000"]
                node_type = "worker"
                scheme = "https"
                shutdown_timeout_ms = 500
            "#,
            Path::new("node.toml"),
        )
        .expect("valid toml");
        assert_eq!(config.lookup.len(), 2);
        assert_eq!(config.scheme, Scheme::Https);
        assert_eq!(config.refresh_interval_ms, 1_000);
        assert_eq!(config.shutdown_policy().timeout, Duration::from_millis(500));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = NodeConfig::from_toml_str("hots = \"x\"", Path::new("node.toml"))
            .expect_err("typo in key");
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn cli_overrides_file_and_env_only_fills_the_gap() {
        let cli = Cli::parse_from([
            "lookup-node",
            "--host",
            "10.9.9.9:9100",
            "--node-type",
            "gateway",
            "--log-level",
            "5",
            "--tls-cert",
            "/srv/pem/node.crt",
        ]);
        let config = valid()
            .merge_cli(&cli)
            .with_lookup_fallback(Some("10.0.0.8:7000"));
        assert_eq!(config.host, "10.9.9.9:9100");
        assert_eq!(config.node_type, "gateway");
        assert_eq!(config.log_level, 5);
        assert_eq!(config.tls_cert, Path::new("/srv/pem/node.crt"));
        assert!(config.tls_key.ends_with("etc/pem/server.key"));
        assert_eq!(config.lookup, ["10.0.0.1:7000"]);

        let config = NodeConfig {
            lookup: Vec::new(),
            ..valid()
        }
        .with_lookup_fallback(Some("10.0.0.8:7000, 10.0.0.9:7000,"));
        assert_eq!(config.lookup, ["10.0.0.8:7000", "10.0.0.9:7000"]);
    }

    #[test]
    fn missing_lookup_and_type_are_reported() {
        let config = NodeConfig {
            lookup: Vec::new(),
            ..valid()
        };
        assert!(matches!(config.validate(), Err(ConfigError::MissingLookup)));
        let config = NodeConfig {
            node_type: String::new(),
            ..valid()
        };
        assert!(matches!(config.validate(), Err(ConfigError::MissingNodeType)));
    }
}
