//! Built-in demo tools.
//!
//! Served by `switchboard-mcp-server` and used throughout the tests:
//! - `echo`: returns its `message` argument
//! - `calculator`: basic arithmetic on two numbers
//! - `sleep`: waits before answering, for timeout and ordering tests

pub mod calculator;
pub mod echo;
pub mod sleep;

pub use calculator::CalculatorTool;
pub use echo::EchoTool;
pub use sleep::SleepTool;
