use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::AgentCommand;
use crate::domain::QueueMode;
use crate::domain::StructuredError;
use crate::usecases::ports::BridgeEvent;
use crate::usecases::ports::BridgePort;
use crate::usecases::ports::BridgeStatus;

type Responder = dyn Fn(AgentCommand, &Value) -> Result<Value, StructuredError> + Send + Sync;

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchCall {
    pub command: AgentCommand,
    pub payload: Value,
    pub mode: QueueMode,
    pub timeout: Duration,
}

/// Scripted agent: every dispatch is recorded and answered by `responder`.
pub struct MockBridge {
    responder: Box<Responder>,
    calls: Mutex<Vec<DispatchCall>>,
    status: BridgeStatus,
}

impl MockBridge {
    pub fn new(
        responder: impl Fn(AgentCommand, &Value) -> Result<Value, StructuredError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
            status: BridgeStatus::default(),
        }
    }

    pub fn with_status(mut self, status: BridgeStatus) -> Self {
        self.status = status;
        self
    }

    pub fn calls(&self) -> Vec<DispatchCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, command: AgentCommand) -> Vec<DispatchCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.command == command)
            .collect()
    }
}

#[async_trait]
impl BridgePort for MockBridge {
    async fn dispatch(
        &self,
        command: AgentCommand,
        payload: Value,
        mode: QueueMode,
        timeout: Duration,
    ) -> Result<Value, StructuredError> {
        let outcome = (self.responder)(command, &payload);
        self.calls.lock().unwrap().push(DispatchCall {
            command,
            payload,
            mode,
            timeout,
        });
        outcome
    }

    fn status(&self) -> BridgeStatus {
        self.status.clone()
    }

    fn recent_events(&self, _limit: usize) -> Vec<BridgeEvent> {
        Vec::new()
    }
}
