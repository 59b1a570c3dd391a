//! Observability for the rbacguard binary: structured logging only.

mod logging;

pub use logging::{create_json_layer, init_logging, parse_log_level, LoggingConfig};
