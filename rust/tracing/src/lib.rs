pub mod filter;
pub mod init_tracer;

pub use filter::{LogFilter, LogLevel};
pub use init_tracer::TracingConfig;
