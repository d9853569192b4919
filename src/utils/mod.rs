pub mod telemetry;

pub use telemetry::{TelemetryInitError, init_tracing, truncate};
