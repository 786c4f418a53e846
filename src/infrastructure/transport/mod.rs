pub mod retry;

pub use retry::{RetryPolicy, RetryTransport};
