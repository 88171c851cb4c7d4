//! Wire formats: the client command API and the agent bridge envelopes.

pub mod bridge_protocol;
pub mod rpc;
