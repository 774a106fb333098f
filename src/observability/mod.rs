pub mod metrics;
pub mod rate_limited_logger;
pub mod tracing;

pub use rate_limited_logger::RateLimitedLogger;
