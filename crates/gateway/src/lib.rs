#![forbid(unsafe_code)]

pub mod config;
pub mod http;
pub mod repository;

pub use config::GatewayConfig;
pub use http::HttpGateway;
pub use repository::{
    AttemptSubmission, GatewayError, InMemoryGateway, SubmissionAck, SubmissionGateway,
    TestCatalog,
};
