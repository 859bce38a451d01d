use std::{
    fmt,
    net::SocketAddr,
    sync::{Arc, Weak},
};

use axum::Router;
use lookup_client::{
    DiscoveryClient, EventHookRegistry, HttpTransport, SysEventId, Transport, TransportSettings,
    admin_router,
};
use lookup_core::{LoadBalancer, NodeRegistry, Scheme, ServiceNode};
use tokio::{net::TcpListener, task::JoinHandle};
use tracing::{error, info, warn};

use crate::{
    config::NodeConfig,
    error::BootError,
    logging::LogLevelHandle,
    shutdown::{ProcessExit, ShutdownCoordinator, StdProcessExit},
    signal::spawn_signal_listener,
    stack::StackDumper,
    tls,
};

/// `NodeHostBuilder` 聚合服务节点启动所需的全部装配步骤。
///
/// # 教案级注释
/// - **设计目标 (Why)**
///   - 把“配置 → 注册表与客户端 → 默认运维事件 → 管理面 → 注册与刷新 → 信号监听”这条固定链路
///     收敛到一个入口，业务进程只需提供自身路由；
///   - 传输层、进程退出与日志句柄都可替换，便于在测试中以内存替身驱动完整启动流程。
/// - **关键流程 (How)**
///   1. 校验配置并构造 [`NodeRegistry`]、[`LoadBalancer`]、[`EventHookRegistry`] 与 [`DiscoveryClient`]；
///   2. 注册默认事件：`setLogLevel`（提供日志句柄时）、`dumpAppStack`、`nodeUpdatedNotify`；
///   3. 监听管理面地址，合并业务路由后启动 axum 服务；`https` 节点在同一端口上先完成 TLS 握手；
///   4. 向命名节点注册本节点，并把同样的注销逻辑登记为退出回调；
///   5. 启动刷新循环与信号监听。
/// - **契约 (What)**
///   - 任一步骤失败都返回 [`BootError`]，此时尚未启动任何后台任务以外的副作用可以忽略；
///   - 成功返回的 [`RunningNode`] 持有全部后台任务句柄。
pub struct NodeHostBuilder {
    config: NodeConfig,
    routes: Router,
    transport: Option<Arc<dyn Transport>>,
    process_exit: Arc<dyn ProcessExit>,
    log_level: Option<LogLevelHandle>,
}

impl NodeHostBuilder {
    pub fn new(config: NodeConfig) -> Self {
        Self {
            config,
            routes: Router::new(),
            transport: None,
            process_exit: Arc::new(StdProcessExit),
            log_level: None,
        }
    }

    /// 合并到管理面上的业务路由。
    #[must_use]
    pub fn with_routes(mut self, routes: Router) -> Self {
        self.routes = routes;
        self
    }

    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    #[must_use]
    pub fn with_process_exit(mut self, process_exit: Arc<dyn ProcessExit>) -> Self {
        self.process_exit = process_exit;
        self
    }

    /// 提供后才会注册 `setLogLevel` 事件。
    #[must_use]
    pub fn with_log_level(mut self, handle: LogLevelHandle) -> Self {
        self.log_level = Some(handle);
        self
    }

    pub async fn start(self) -> Result<RunningNode, BootError> {
        let config = self.config;
        config.validate()?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(&TransportSettings::default())?),
        };
        let registry = Arc::new(NodeRegistry::new(
            config.node_type.as_str(),
            config.identifier(),
            config.lookup.clone(),
        ));
        let client = Arc::new(DiscoveryClient::new(
            registry,
            Arc::new(LoadBalancer::new()),
            Arc::new(EventHookRegistry::new()),
            transport,
            config.discovery_settings(),
        ));

        let stack = Arc::new(StackDumper::new(
            &config.stack_dump_dir,
            &format!("{}.{}", config.node_type, config.identifier()),
        ));
        let coordinator = Arc::new(
            ShutdownCoordinator::new(config.shutdown_policy(), self.process_exit)
                .with_stack_dumper(Arc::clone(&stack)),
        );
        register_default_hooks(&client, &stack, self.log_level);

        let tls_config = match config.scheme {
            Scheme::Https => Some(tls::load_server_config(&config.tls_cert, &config.tls_key)?),
            Scheme::Http => None,
        };
        let bind_addr = config.bind_address();
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|source| BootError::Bind {
                addr: bind_addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| BootError::Bind {
            addr: bind_addr.clone(),
            source,
        })?;
        let app = admin_router(Arc::clone(&client)).merge(self.routes);
        let server_token = coordinator.shutdown_token();
        let server = match tls_config {
            Some(tls_config) => {
                tokio::spawn(tls::serve_tls(listener, tls_config, app, server_token))
            }
            None => tokio::spawn(async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(async move { server_token.cancelled().await })
                    .await
            }),
        };
        info!(
            %local_addr,
            scheme = config.scheme.as_str(),
            app_uid = client.app_uid(),
            "admin server listening"
        );

        let local = ServiceNode::new(
            client.app_uid(),
            config.node_type.as_str(),
            config.host.clone(),
            config.scheme,
        );
        if client.register_all(std::slice::from_ref(&local)).await == 0 {
            warn!(uid = %local.uid, "initial registration failed, retrying on next refresh");
        }
        coordinator.add_exit_hook(client.deregistration_hook(vec![local.clone()]));

        let discovery = {
            let client = Arc::clone(&client);
            let token = coordinator.shutdown_token();
            tokio::spawn(async move { client.run(vec![local], token).await })
        };
        let signals = spawn_signal_listener(Arc::clone(&coordinator));

        Ok(RunningNode {
            client,
            coordinator,
            local_addr,
            server,
            discovery,
            signals,
        })
    }
}

impl fmt::Debug for NodeHostBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeHostBuilder")
            .field("config", &self.config)
            .field("custom_transport", &self.transport.is_some())
            .field("log_level", &self.log_level.is_some())
            .finish()
    }
}

fn register_default_hooks(
    client: &Arc<DiscoveryClient>,
    stack: &Arc<StackDumper>,
    log_level: Option<LogLevelHandle>,
) {
    let events = client.events();

    if let Some(handle) = log_level {
        events.register_sys_hook(SysEventId::SetLogLevel, move |args| {
            let [level] = args else {
                warn!(?args, "setLogLevel expects exactly one argument");
                return false;
            };
            match level.trim().parse::<i64>() {
                Ok(level) => match handle.set_numeric(level) {
                    Ok(_) => true,
                    Err(err) => {
                        error!(error = %err, "failed to change log level");
                        false
                    }
                },
                Err(err) => {
                    warn!(%level, error = %err, "setLogLevel argument is not an integer");
                    false
                }
            }
        });
    }

    let stack = Arc::clone(stack);
    events.register_sys_hook(SysEventId::DumpAppStack, move |_| {
        match stack.dump_on_demand() {
            Ok(written) => written,
            Err(err) => {
                error!(error = %err, "failed to write stack snapshot");
                false
            }
        }
    });

    let weak: Weak<DiscoveryClient> = Arc::downgrade(client);
    events.register_sys_hook(SysEventId::NodeUpdatedNotify, move |_| {
        match weak.upgrade() {
            Some(client) => {
                client.notify_topology_dirty();
                true
            }
            None => false,
        }
    });
}

/// 已启动的服务节点。
pub struct RunningNode {
    client: Arc<DiscoveryClient>,
    coordinator: Arc<ShutdownCoordinator>,
    local_addr: SocketAddr,
    server: JoinHandle<std::io::Result<()>>,
    discovery: JoinHandle<()>,
    signals: JoinHandle<()>,
}

impl RunningNode {
    #[must_use]
    pub fn client(&self) -> &Arc<DiscoveryClient> {
        &self.client
    }

    #[must_use]
    pub fn coordinator(&self) -> &Arc<ShutdownCoordinator> {
        &self.coordinator
    }

    /// 管理面实际监听的地址。
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 等待节点走完关闭序列。
    ///
    /// 管理面服务异常退出时以退出码 1 发起关闭，并把服务错误返回给调用方。
    pub async fn wait(self) -> Result<(), BootError> {
        let served = self
            .server
            .await
            .map_err(|_| BootError::Join { task: "admin-server" })?;
        if let Err(source) = served {
            error!(addr = %self.local_addr, error = %source, "admin server failed");
            self.coordinator.request_exit(1).await;
            return Err(BootError::Serve {
                addr: self.local_addr,
                source,
            });
        }

        self.discovery
            .await
            .map_err(|_| BootError::Join { task: "discovery" })?;
        self.coordinator.exited().await;
        self.signals.abort();
        Ok(())
    }
}

impl fmt::Debug for RunningNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunningNode")
            .field("app_uid", &self.client.app_uid())
            .field("local_addr", &self.local_addr)
            .field("state", &self.coordinator.state())
            .finish()
    }
}
