pub mod circuit_breaker;
pub mod http_client_factory;
pub mod log_redaction;
pub mod masking;

pub use circuit_breaker::CircuitBreaker;
pub use http_client_factory::HttpClientFactory;
pub use log_redaction::RedactingMakeWriter;
pub use masking::mask_secret;
