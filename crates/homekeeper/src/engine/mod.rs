mod dispatcher;
mod engine;
mod event;
mod integration;
mod message;
pub mod policy;
pub mod presence;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use dispatcher::Dispatcher;
pub use engine::Engine;
pub use engine::EngineError;
pub use event::DailyEvent;
pub use event::ScheduleError;
pub use event::ScheduleRecord;
pub use event::ScheduledTrigger;
pub use integration::Actuator;
pub use integration::ReachabilityProbe;
pub use integration::TransportError;
pub use message::ActuationCommand;
pub use message::InboundMessage;
pub use policy::Decision;
pub use policy::Reason;
pub use policy::Request;
pub use presence::PresenceDebouncer;
pub use presence::Transition;
pub use state::Device;
pub use state::DeviceType;
pub use state::MobileDevice;
pub use state::SensorStats;
