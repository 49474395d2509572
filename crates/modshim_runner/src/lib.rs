//! # modshim_runner
//!
//! External command execution for modshim.
//!
//! Module resolution shells out to the Terraform initializer. This crate puts
//! that behind the [`CommandRunner`] trait so resolution can be driven by a
//! real subprocess or by a scripted [`MockRunner`] in tests.
//!
//! # Features
//!
//! - **Per-invocation environment**: variables are set on the child process only
//! - **Streaming**: output lines can be forwarded to a [`LineHandler`] as they arrive
//! - **Timeouts**: optional, imposed per command
//! - **Mock Runner**: captures calls and replays canned output
//!
//! # Example
//!
//! ```rust,no_run
//! use modshim_runner::{CommandRunner, CommandSpec, SystemRunner};
//!
//! # async fn example() -> Result<(), modshim_runner::RunnerError> {
//! let runner = SystemRunner::new();
//! let spec = CommandSpec::new("terraform")
//!     .args(["init", "-json"])
//!     .workdir("/tmp/shim")
//!     .env("TF_DATA_DIR", "/tmp/state");
//! let result = runner.run(&spec).await?;
//! println!("exit code: {}", result.exit_code);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod mock;
pub mod runner;
pub mod system;

pub use config::CommandSpec;
pub use error::{RunnerError, RunnerResult};
pub use mock::{CapturedCall, MockResponse, MockRunner};
pub use runner::{CommandRunner, ExecutionResult};
pub use system::{LineHandler, LogLine, LogStream, SystemRunner};
