//! Test utilities for midrive
//!
//! - [`FakeDebugger`] - plays the debugger on a loopback channel, records
//!   every command and answers from a [`Script`] or closure
//! - [`fake_session`] - a `Session` wired to a fresh `FakeDebugger`
//! - [`proptest_config`] - shared property-test configurations
//!
//! # Usage
//!
//! ```no_run
//! use midrive_testing::{fake_session, Script};
//!
//! # #[tokio::main]
//! # async fn main() -> midrive_mi::Result<()> {
//! let script = Script::new().on("-thread-info", &[r#"^done,threads=[],current-thread-id="1""#]);
//! let (session, fake) = fake_session(script.into_responder());
//! session.execute("-thread-info", None).await?;
//! assert_eq!(fake.commands(), vec!["-thread-info".to_string()]);
//! # Ok(())
//! # }
//! ```

mod fake_debugger;
pub mod proptest_config;

pub use fake_debugger::{fake_session, fake_session_with, FakeDebugger, Responder, Script};
