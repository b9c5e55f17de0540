//! midrive MI - debugger protocol engine
//!
//! Drives an external GDB/LLDB-family debugger through its line-oriented
//! machine interface and exposes a typed, asynchronous command API.
//!
//! # Architecture
//!
//! - `transport` - line channels to the debugger (local pipe, TCP/TLS,
//!   serial, SSH-style shell, terminal-hosted, loopback) with exit detection
//! - `parser` / `protocol` / `value` - reply grammar and the parsed value tree
//! - `lock` - the context-switch lock (exclusive, shared, atomic downgrade)
//! - `session` - FIFO request/reply matching, event fan-out, exit handling
//! - `dialect` - per-backend command text and capabilities
//! - `commands` - the backend-independent command vocabulary
//!
//! # Usage
//!
//! ```no_run
//! use midrive_mi::{CommandFactory, DialectKind, Launch, Session, SessionOptions};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> midrive_mi::Result<()> {
//! let config = midrive_config::Config::default();
//! let launch = Launch::local("gdb", vec!["--interpreter=mi".to_string()]);
//! let session = Arc::new(Session::launch(&launch, &config, SessionOptions::default()).await?);
//! session.wait_ready(config.session.ready_timeout()).await?;
//!
//! let gdb = CommandFactory::for_kind(session.clone(), DialectKind::Gdb);
//! let frames = gdb.stack_list_frames(1, 0, 10).await?;
//! println!("{} frames", frames.len());
//! # Ok(())
//! # }
//! ```

pub mod commands;
pub mod constants;
pub mod dialect;
pub mod error;
pub mod lock;
pub mod parser;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod value;

pub use commands::types::{
    BreakLocation, BreakOptions, Checksum, DebuggerVersion, ExceptionBreakState,
    ExceptionCategory, Frame, HashAlgorithm, PrintValues, TargetArchitecture, ThreadsInfo,
    VarFormat, VarObject,
};
pub use commands::CommandFactory;
pub use dialect::{Clrdbg, ContextStyle, Dialect, DialectCapabilities, DialectKind, Gdb, Lldb};
pub use error::{Error, Result};
pub use lock::{ContextLock, ContextLockToken, HoldKind, LockSnapshot};
pub use parser::{parse_line, ParseError};
pub use protocol::{
    AsyncClass, AsyncKind, AsyncRecord, Reply, ResultClass, ResultRecord, StopEvent,
    StreamChannel, StreamRecord,
};
pub use session::{
    CommandOptions, CommandOutput, CurrentContext, Selection, Session, SessionEvent,
    SessionOptions,
};
pub use transport::{
    loopback, Launch, LaunchDescriptor, LineTransport, LoopbackPeer, TransportEvent,
    TransportEvents, TransportState,
};
pub use value::{List, Lookup, Tuple, Value, ValueError};
