//! 独立运行的服务节点：注册到命名节点、维护拓扑并响应管理事件，直到收到终止信号。

use anyhow::Context;
use clap::Parser;
use lookup_hosting::{Cli, NodeConfig, NodeHostBuilder, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = NodeConfig::load(&cli).context("loading node configuration")?;
    let log_level = logging::install(config.log_level).context("installing logging")?;

    let node = NodeHostBuilder::new(config)
        .with_log_level(log_level)
        .start()
        .await
        .context("starting node")?;
    node.wait().await.context("running node")?;
    Ok(())
}
