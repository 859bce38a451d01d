//! 操作系统信号监听。
//!
//! 收到 SIGTERM 或 SIGINT（非 unix 平台为 Ctrl-C）后以信号编号作为终止原因进入关闭序列；
//! 若关闭已由其它途径发起，监听任务随共享令牌一同结束。

use std::{io, sync::Arc};

use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::shutdown::{ShutdownCoordinator, TerminationCause};

pub const SIGINT: i32 = 2;
pub const SIGTERM: i32 = 15;

/// 启动信号监听任务。
pub fn spawn_signal_listener(coordinator: Arc<ShutdownCoordinator>) -> JoinHandle<()> {
    let token = coordinator.shutdown_token();
    tokio::spawn(async move {
        tokio::select! {
            () = token.cancelled() => {
                info!("shutdown already started, signal listener stopping");
            }
            received = wait_for_signal() => match received {
                Ok(signal) => {
                    info!(signal, "termination signal received");
                    coordinator.terminate(TerminationCause::OsSignal(signal)).await;
                }
                Err(err) => error!(error = %err, "failed to install signal handlers"),
            },
        }
    })
}

#[cfg(unix)]
async fn wait_for_signal() -> io::Result<i32> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    tokio::select! {
        _ = terminate.recv() => Ok(SIGTERM),
        _ = interrupt.recv() => Ok(SIGINT),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> io::Result<i32> {
    tokio::signal::ctrl_c().await?;
    Ok(SIGINT)
}
