pub mod config;
pub mod engine;
pub mod integrations;
pub mod scheduler;
pub mod shutdown;
pub mod store;

pub use config::Config;
pub use config::LogLevel;
pub use engine::Engine;
pub use engine::EngineError;
pub use scheduler::Scheduler;
pub use store::DeviceStore;
pub use store::JsonFileStore;
