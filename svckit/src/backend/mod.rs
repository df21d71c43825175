pub mod factory;
pub mod hosted;
pub mod memory;
pub mod realtime;
pub mod service;

pub use factory::{BackendDriver, BackendFactory};
pub use hosted::HostedBackend;
pub use memory::MemoryBackend;
pub use service::{DataService, Subscription, SubscriptionProducer};
