//! Multi-car Dash telemetry recorder.

pub mod config;
pub mod supervisor;

pub use config::{ConfigError, RecorderConfig, SessionDescriptor};
pub use supervisor::{SessionHandle, SessionOutcome, Stopper, Supervisor, SupervisorError};

/// Logs to stderr so the live readout on stdout stays readable.
/// Level comes from `RUST_LOG`, default `info`.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}
