pub mod bridge;
#[cfg(test)]
pub(crate) mod test_support;

pub use bridge::BridgeEvent;
pub use bridge::BridgeHandle;
pub use bridge::BridgePort;
pub use bridge::BridgeStatus;
pub use bridge::LinkPhase;
