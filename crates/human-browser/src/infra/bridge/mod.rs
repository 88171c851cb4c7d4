mod events;
mod manager;

pub use events::EventLog;
pub use manager::BridgeManager;
pub use manager::ConnectionId;
pub use manager::OutboundSender;
