//! 宿主层错误类型。
//!
//! - `ConfigError`：配置读取与校验失败，启动前即可发现；
//! - `LoggingError`：全局日志订阅器安装或级别调整失败；
//! - `TlsError`：管理面证书或私钥无法加载；
//! - `BootError`：装配与运行期失败，汇总上述两类并补充监听、服务错误。

use std::{io, net::SocketAddr, path::PathBuf};

use lookup_client::TransportError;
use thiserror::Error;

/// 配置错误。
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file `{path}`: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// 地址不满足 `host:port` 形式或主机不可对外访问。
    #[error("invalid address `{addr}`: {reason}")]
    InvalidAddress { addr: String, reason: &'static str },

    #[error("no lookup address configured (flag, config file or NODE_LOOKUP)")]
    MissingLookup,

    #[error("node type must not be empty")]
    MissingNodeType,
}

/// 日志安装错误。
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("logging has already been installed")]
    AlreadyInstalled,

    #[error("a global tracing subscriber is already set")]
    SubscriberAlreadySet,

    #[error("failed to set global subscriber: {0}")]
    SetGlobal(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("failed to reload log filter: {0}")]
    Reload(#[from] tracing_subscriber::reload::Error),
}

/// 管理面 TLS 材料加载错误。
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read certificate chain `{path}`: {source}")]
    Certificate {
        path: PathBuf,
        #[source]
        source: rustls_pki_types::pem::Error,
    },

    #[error("certificate file `{path}` contains no certificate")]
    EmptyChain { path: PathBuf },

    #[error("failed to read private key `{path}`: {source}")]
    PrivateKey {
        path: PathBuf,
        #[source]
        source: rustls_pki_types::pem::Error,
    },

    #[error("invalid TLS server configuration: {0}")]
    Config(#[from] rustls::Error),
}

/// 启动与运行期错误。
#[derive(Debug, Error)]
pub enum BootError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Logging(#[from] LoggingError),

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error("failed to build transport: {0}")]
    Transport(#[from] TransportError),

    #[error("failed to bind admin listener on `{addr}`: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("admin server on `{addr}` stopped: {source}")]
    Serve {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("background task `{task}` panicked or was aborted")]
    Join { task: &'static str },
}
