#![deny(unsafe_code)]
#![doc = "lookup-hosting: 服务节点宿主装配、优雅退出与运维事件。"]

pub mod boot;
pub mod config;
pub mod error;
pub mod logging;
pub mod shutdown;
pub mod signal;
pub mod stack;
pub mod tls;

pub use boot::{NodeHostBuilder, RunningNode};
pub use config::{Cli, NodeConfig};
pub use error::{BootError, ConfigError, LoggingError, TlsError};
pub use logging::LogLevelHandle;
pub use shutdown::{
    ExitHook, ProcessExit, ShutdownCoordinator, ShutdownPolicy, ShutdownState, StdProcessExit,
    TerminationCause,
};
pub use stack::StackDumper;
