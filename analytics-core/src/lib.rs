pub mod builder;
pub mod client;
pub mod config;
pub mod error;
pub mod message;
pub mod retry;
pub mod timestamp;

pub use builder::{build_message, EventDescriptor};
pub use client::{AnalyticsClient, Callback, ClientBuilder, DeliveryClient};
pub use error::{BuildError, ClientError, DeliveryError};
pub use message::{MessageKind, TypedMessage};
