//! Query execution gateway: requests, typed results, executor capability,
//! and the retrying dispatch pipeline.
//!
//! # Module Structure
//! - `request`: `QueryRequest` builder and `$(variable)` substitution
//! - `result`: typed `QueryResult` / `SqlValue` model and shaping
//! - `executor`: `QueryExecutor` capability trait and subprocess impl
//! - `gateway`: the validate → rewrite → dispatch → retry → parse pipeline

mod executor;
mod gateway;
mod request;
mod result;

pub use executor::{ExecutorOutput, GatewayConfig, ProcessExecutor, QueryExecutor};
pub use gateway::QueryGateway;
pub use request::{QueryRequest, ReturnShape};
pub use result::{QueryResult, Row, ShapedResult, SqlValue};
