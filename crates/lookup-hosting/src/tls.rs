//! # tls 模块说明
//!
//! ## 设计定位（Why）
//! - 节点以 `https` 注册时，对端一律按 TLS 拨号，管理面必须在同一端口上完成 TLS 握手；
//! - axum 自带的 `serve` 只处理明文连接，这里在 `TcpListener` 与 `Router` 之间插入
//!   `tokio-rustls` 握手，再交给 `hyper-util` 的自动协议连接（HTTP/1.1 与 h2 皆可）。
//!
//! ## 契约（What）
//! - [`load_server_config`]：从 PEM 文件读取证书链与私钥，ALPN 依次声明 `h2`、`http/1.1`；
//! - [`serve_tls`]：关闭令牌触发后停止接受新连接，已建立的连接发起优雅关闭并等待其结束。

use std::{io, net::SocketAddr, path::Path, sync::Arc, time::Duration};

use axum::Router;
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto,
    service::TowerToHyperService,
};
use rustls::ServerConfig;
use rustls_pki_types::{CertificateDer, PrivateKeyDer, pem::PemObject};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, warn};

use crate::error::TlsError;

/// 接受连接失败（如文件描述符耗尽）后的退避时长。
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// 读取 PEM 证书链与私钥，构造服务端 TLS 配置。
pub fn load_server_config(cert: &Path, key: &Path) -> Result<Arc<ServerConfig>, TlsError> {
    let chain = CertificateDer::pem_file_iter(cert)
        .and_then(|certs| certs.collect::<Result<Vec<_>, _>>())
        .map_err(|source| TlsError::Certificate {
            path: cert.to_path_buf(),
            source,
        })?;
    if chain.is_empty() {
        return Err(TlsError::EmptyChain {
            path: cert.to_path_buf(),
        });
    }
    let private_key = PrivateKeyDer::from_pem_file(key).map_err(|source| TlsError::PrivateKey {
        path: key.to_path_buf(),
        source,
    })?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(chain, private_key)?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Ok(Arc::new(config))
}

/// 在 `listener` 上以 TLS 提供 `app`，直到 `shutdown` 被取消。
///
/// # 教案级注释
/// - **关键流程 (How)**
///   1. 主循环在关闭令牌与 `accept` 之间择一，令牌优先；
///   2. 每条连接在 [`TaskTracker`] 中独立执行握手与请求处理，握手失败只影响该连接；
///   3. 关闭时连接任务调用 `graceful_shutdown`，处理完在途请求后退出；主循环等待全部连接结束。
/// - **契约 (What)**
///   - 单次 `accept` 失败只记录日志并短暂退避，不结束服务；
///   - 返回值与 `axum::serve` 对齐，便于与明文路径共用同一个任务句柄类型。
pub async fn serve_tls(
    listener: TcpListener,
    config: Arc<ServerConfig>,
    app: Router,
    shutdown: CancellationToken,
) -> io::Result<()> {
    let acceptor = TlsAcceptor::from(config);
    let connections = TaskTracker::new();

    loop {
        let (stream, peer) = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(err) => {
                    warn!(error = %err, "failed to accept admin connection");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            },
        };
        connections.spawn(serve_connection(
            stream,
            peer,
            acceptor.clone(),
            app.clone(),
            shutdown.clone(),
        ));
    }

    connections.close();
    connections.wait().await;
    Ok(())
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    acceptor: TlsAcceptor,
    app: Router,
    shutdown: CancellationToken,
) {
    let stream = match acceptor.accept(stream).await {
        Ok(stream) => stream,
        Err(err) => {
            debug!(%peer, error = %err, "tls handshake failed");
            return;
        }
    };

    let builder = auto::Builder::new(TokioExecutor::new());
    let connection = builder.serve_connection(TokioIo::new(stream), TowerToHyperService::new(app));
    tokio::pin!(connection);
    let finished = tokio::select! {
        outcome = connection.as_mut() => Some(outcome),
        () = shutdown.cancelled() => None,
    };
    let outcome = match finished {
        Some(outcome) => outcome,
        None => {
            connection.as_mut().graceful_shutdown();
            connection.await
        }
    };
    if let Err(err) = outcome {
        debug!(%peer, error = %err, "admin connection closed with error");
    }
}
