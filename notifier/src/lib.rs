pub mod service;
pub mod transport;

pub use service::Notifier;
pub use transport::{HttpPushTransport, LoggingPushTransport, PushOutcome, PushTransport};
