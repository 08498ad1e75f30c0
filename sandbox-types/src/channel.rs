//! Typed unidirectional channel pair between host and runtime
//!
//! Each side owns one sender and one receiver. Delivery is asynchronous and
//! ordered per direction; there is no ordering between directions.

use crate::codec::ProtocolError;
use crate::{HostMessage, RuntimeMessage};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Host side of the link: sends [`HostMessage`], receives [`RuntimeMessage`]
#[derive(Debug)]
pub struct HostPort {
    outbound: UnboundedSender<HostMessage>,
    inbound: UnboundedReceiver<RuntimeMessage>,
}

/// Runtime side of the link: sends [`RuntimeMessage`], receives [`HostMessage`]
#[derive(Debug)]
pub struct RuntimePort {
    outbound: UnboundedSender<RuntimeMessage>,
    inbound: UnboundedReceiver<HostMessage>,
}

/// Create a connected host/runtime port pair
pub fn channel() -> (HostPort, RuntimePort) {
    let (host_tx, runtime_rx) = mpsc::unbounded_channel();
    let (runtime_tx, host_rx) = mpsc::unbounded_channel();

    (
        HostPort {
            outbound: host_tx,
            inbound: host_rx,
        },
        RuntimePort {
            outbound: runtime_tx,
            inbound: runtime_rx,
        },
    )
}

impl HostPort {
    pub fn from_parts(
        outbound: UnboundedSender<HostMessage>,
        inbound: UnboundedReceiver<RuntimeMessage>,
    ) -> Self {
        Self { outbound, inbound }
    }

    pub fn send(&self, message: HostMessage) -> Result<(), ProtocolError> {
        self.outbound
            .send(message)
            .map_err(|_| ProtocolError::Disconnected)
    }

    pub async fn recv(&mut self) -> Option<RuntimeMessage> {
        self.inbound.recv().await
    }

    pub fn try_recv(&mut self) -> Option<RuntimeMessage> {
        self.inbound.try_recv().ok()
    }

    pub fn into_parts(
        self,
    ) -> (
        UnboundedSender<HostMessage>,
        UnboundedReceiver<RuntimeMessage>,
    ) {
        (self.outbound, self.inbound)
    }
}

impl RuntimePort {
    pub fn from_parts(
        outbound: UnboundedSender<RuntimeMessage>,
        inbound: UnboundedReceiver<HostMessage>,
    ) -> Self {
        Self { outbound, inbound }
    }

    pub fn send(&self, message: RuntimeMessage) -> Result<(), ProtocolError> {
        self.outbound
            .send(message)
            .map_err(|_| ProtocolError::Disconnected)
    }

    pub async fn recv(&mut self) -> Option<HostMessage> {
        self.inbound.recv().await
    }

    pub fn try_recv(&mut self) -> Option<HostMessage> {
        self.inbound.try_recv().ok()
    }

    pub fn into_parts(
        self,
    ) -> (
        UnboundedSender<RuntimeMessage>,
        UnboundedReceiver<HostMessage>,
    ) {
        (self.outbound, self.inbound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_messages_arrive_in_send_order() {
        let (host, mut runtime) = channel();

        for code in ["a", "b", "c"] {
            host.send(HostMessage::ExecuteCode {
                code: code.to_string(),
            })
            .unwrap();
        }

        let mut received = Vec::new();
        while let Some(HostMessage::ExecuteCode { code }) = runtime.try_recv() {
            received.push(code);
        }
        assert_eq!(received, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_runtime_to_host() {
        let (mut host, runtime) = channel();
        runtime.send(RuntimeMessage::FrameReady).unwrap();
        assert_eq!(host.recv().await, Some(RuntimeMessage::FrameReady));
    }

    #[test]
    fn test_send_after_peer_dropped() {
        let (host, runtime) = channel();
        drop(runtime);
        let result = host.send(HostMessage::ExecuteCode {
            code: String::new(),
        });
        assert!(matches!(result, Err(ProtocolError::Disconnected)));
    }
}
