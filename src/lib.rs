//! Toolrunner: execution engine for OpenAPI-described HTTP tools.
//!
//! Turns a tool contract plus model-produced JSON arguments into an encoded
//! HTTP request, attaches plugin credentials (service tokens or OAuth2
//! authorization-code tokens), sends it, and trims the response to the
//! declared schema. Also owns the OAuth credential lifecycle and its
//! background refresh daemon.

pub mod catalog;
pub mod config;
pub mod contract;
pub mod encoder;
pub mod engine;
pub mod error;
pub mod oauth;
pub mod request;
pub mod response;
pub mod state;
pub mod traits;
pub mod types;

pub use engine::{ExecOutcome, ExecuteOptions, ExecuteRequest, ExecuteResponse, ProjectInfo, ToolEngine};
pub use error::{EngineError, EngineResult, ErrorKind};
