//! Small shared helpers.

pub mod http_client;
pub mod timeout;

pub use timeout::with_timeout;
