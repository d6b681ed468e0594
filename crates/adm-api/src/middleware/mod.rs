//! Request middleware: tracing spans and the operation log.

pub mod operation_log;
pub mod tracing_layer;
