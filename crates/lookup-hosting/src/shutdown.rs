#![allow(clippy::module_name_repetitions)]

use std::{
    fmt,
    io::{self, Write},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::stack::StackDumper;

/// 退出回调：异步执行，返回是否成功；失败不会中断后续回调。
pub type ExitHook = Box<dyn Fn() -> BoxFuture<'static, bool> + Send + Sync>;

/// 关闭流程的线性状态，只会前进不会回退。
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ShutdownState {
    Running,
    Exiting,
    ExecutingHooks,
    HooksDone,
    Exited,
}

/// 终止原因。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerminationCause {
    /// 操作系统信号，携带信号编号。
    OsSignal(i32),
    /// 进程内主动请求退出，携带退出码。
    UserRequested(i32),
}

impl TerminationCause {
    /// 进程退出码：信号编号或调用方给出的退出码。
    #[must_use]
    pub fn exit_code(self) -> i32 {
        match self {
            TerminationCause::OsSignal(signal) => signal,
            TerminationCause::UserRequested(code) => code,
        }
    }
}

impl fmt::Display for TerminationCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationCause::OsSignal(signal) => write!(f, "os signal {signal}"),
            TerminationCause::UserRequested(code) => write!(f, "user request (code {code})"),
        }
    }
}

/// 进程终止的出口，测试中可替换为记录型实现。
pub trait ProcessExit: Send + Sync + 'static {
    fn exit(&self, code: i32);
}

/// 调用 [`std::process::exit`] 的默认实现。
#[derive(Clone, Copy, Debug, Default)]
pub struct StdProcessExit;

impl ProcessExit for StdProcessExit {
    fn exit(&self, code: i32) {
        std::process::exit(code);
    }
}

/// 关闭时限。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShutdownPolicy {
    /// 等待退出回调链的硬上限。
    pub timeout: Duration,
    /// 关闭窗口的最短持续时间。
    pub min_dwell: Duration,
}

impl Default for ShutdownPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            min_dwell: Duration::from_secs(1),
        }
    }
}

/// `ShutdownCoordinator` 负责串联进程的退出流程。
///
/// # 教案式注解
/// - **架构定位 (Where)**：进程内唯一实例，由宿主装配后以 `Arc` 分发给信号监听任务与需要注册清理逻辑的组件；
/// - **问题动机 (Why)**：信号、运维指令与业务代码都可能请求退出，需要保证清理逻辑恰好执行一次，
///   且无论清理是否卡住，进程都能在有限时间内退出；
/// - **协作方式 (How)**：组件通过 [`Self::add_exit_hook`] 登记清理回调，通过 [`Self::shutdown_token`]
///   监听关闭信号；任意一方调用 [`Self::terminate`] 即进入关闭序列。
///
/// # 契约说明 (What)
/// - **状态**：`Running → Exiting → ExecutingHooks → HooksDone → Exited`；
/// - **幂等**：原子闩锁只放行第一次请求，其后的请求记录日志后丢弃；
/// - **序列**：置 `Exiting` 并取消共享令牌 → 在独立任务中按注册顺序执行回调 → 等待完成或超时 →
///   补足最短停留时间 → 刷新输出、导出调用栈 → 置 `Exited` → 以终止原因的退出码结束进程。
///
/// # 风险提示 (Trade-offs)
/// - 超时后不再等待回调，未完成的清理（例如注销）会被放弃；回调被视为尽力而为的清理，而非持久化步骤；
/// - 序列开始后追加的回调不会执行。
pub struct ShutdownCoordinator {
    latch: AtomicBool,
    state: Arc<Mutex<ShutdownState>>,
    token: CancellationToken,
    exited: CancellationToken,
    hooks: Mutex<Option<Vec<ExitHook>>>,
    policy: ShutdownPolicy,
    process_exit: Arc<dyn ProcessExit>,
    stack: Option<Arc<StackDumper>>,
}

impl ShutdownCoordinator {
    /// 构造处于 `Running` 状态、令牌未取消、回调表为空的协调器。
    pub fn new(policy: ShutdownPolicy, process_exit: Arc<dyn ProcessExit>) -> Self {
        Self {
            latch: AtomicBool::new(false),
            state: Arc::new(Mutex::new(ShutdownState::Running)),
            token: CancellationToken::new(),
            exited: CancellationToken::new(),
            hooks: Mutex::new(Some(Vec::new())),
            policy,
            process_exit,
            stack: None,
        }
    }

    /// 退出前导出调用栈快照。
    #[must_use]
    pub fn with_stack_dumper(mut self, stack: Arc<StackDumper>) -> Self {
        self.stack = Some(stack);
        self
    }

    /// 共享关闭令牌；一旦取消便不再恢复。
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.token.clone()
    }

    #[must_use]
    pub fn state(&self) -> ShutdownState {
        *self.state.lock()
    }

    #[must_use]
    pub fn policy(&self) -> ShutdownPolicy {
        self.policy
    }

    /// 登记退出回调，按登记顺序执行。
    ///
    /// - **返回值**：`false` 表示关闭序列已经取走回调表，本回调被忽略。
    pub fn add_exit_hook<F>(&self, hook: F) -> bool
    where
        F: Fn() -> BoxFuture<'static, bool> + Send + Sync + 'static,
    {
        match self.hooks.lock().as_mut() {
            Some(hooks) => {
                hooks.push(Box::new(hook));
                true
            }
            None => {
                warn!("exit hook added after shutdown started, ignoring");
                false
            }
        }
    }

    /// 以指定退出码请求退出。
    pub async fn request_exit(&self, code: i32) -> bool {
        self.terminate(TerminationCause::UserRequested(code)).await
    }

    /// 执行关闭序列；返回 `false` 表示已有序列在执行，本次请求被丢弃。
    ///
    /// - **等待（How）**：回调链在独立任务中运行，本函数在完成与超时之间竞赛；
    /// - **后置条件**：返回 `true` 时状态为 `Exited`，且已调用一次 [`ProcessExit::exit`]。
    pub async fn terminate(&self, cause: TerminationCause) -> bool {
        if self
            .latch
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(%cause, "termination already in progress, dropping request");
            return false;
        }

        warn!(%cause, "termination requested");
        transition(&self.state, ShutdownState::Exiting);
        self.token.cancel();

        let hooks = self.hooks.lock().take().unwrap_or_default();
        let state = Arc::clone(&self.state);
        let started = Instant::now();
        let chain = tokio::spawn(run_hooks(hooks, state));

        match tokio::time::timeout(self.policy.timeout, chain).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => error!(error = %err, "exit hook chain aborted"),
            Err(_) => warn!(
                timeout = ?self.policy.timeout,
                "exit hooks timed out, exiting anyway"
            ),
        }

        let elapsed = started.elapsed();
        if let Some(remaining) = self.policy.min_dwell.checked_sub(elapsed)
            && !remaining.is_zero()
        {
            tokio::time::sleep(remaining).await;
        }

        flush_output();
        if let Some(stack) = &self.stack
            && let Err(err) = stack.dump_at_exit()
        {
            error!(error = %err, "failed to write exit stack snapshot");
        }

        transition(&self.state, ShutdownState::Exited);
        let code = cause.exit_code();
        info!(code, "process exiting");
        self.exited.cancel();
        self.process_exit.exit(code);
        true
    }

    /// 等待关闭序列走完（状态到达 `Exited`）。
    pub async fn exited(&self) {
        self.exited.cancelled().await;
    }
}

impl fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("state", &self.state())
            .field("hook_count", &self.hooks.lock().as_ref().map_or(0, Vec::len))
            .field("policy", &self.policy)
            .finish()
    }
}

async fn run_hooks(hooks: Vec<ExitHook>, state: Arc<Mutex<ShutdownState>>) {
    transition(&state, ShutdownState::ExecutingHooks);
    let total = hooks.len();
    for (index, hook) in hooks.iter().enumerate() {
        let succeeded = hook().await;
        if succeeded {
            info!(hook = index + 1, total, "exit hook finished");
        } else {
            warn!(hook = index + 1, total, "exit hook reported failure");
        }
    }
    transition(&state, ShutdownState::HooksDone);
}

fn transition(state: &Mutex<ShutdownState>, next: ShutdownState) {
    let mut current = state.lock();
    if next <= *current {
        return;
    }
    info!(from = ?*current, to = ?next, "shutdown state changed");
    *current = next;
}

fn flush_output() {
    flush_stream("stdout", &mut io::stdout());
    flush_stream("stderr", &mut io::stderr());
}

fn flush_stream(name: &'static str, stream: &mut impl Write) -> bool {
    match stream.flush() {
        Ok(()) => true,
        Err(err) => {
            warn!(stream = name, error = %err, "failed to flush output");
            false
        }
    }
}
