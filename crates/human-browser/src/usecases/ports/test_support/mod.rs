mod mock_bridge;

pub use mock_bridge::DispatchCall;
pub use mock_bridge::MockBridge;
