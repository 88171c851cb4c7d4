#![deny(clippy::all)]

//! Domain types: commands, structured errors, the snapshot registry, and diffing.

pub mod command;
pub mod diff;
pub mod error;
pub mod snapshot;

pub use command::AgentCommand;
pub use command::QueueMode;
pub use command::TabTarget;
pub use error::StructuredError;
pub use snapshot::CapturedNode;
pub use snapshot::RegistryError;
pub use snapshot::ResolvedRef;
pub use snapshot::Snapshot;
pub use snapshot::SnapshotRegistry;
pub use snapshot::TabId;
