//! Registry events and the subscription handle.
//!
//! Both delivery paths (live subscription and backfill poll) produce the
//! same [`LedgerEvent`] values, so the reconciler can run one dispatch
//! function for both.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A confirmed registry event.
///
/// The serialized form matches the registry node's `registry_getEvents`
/// response, discriminated by the `event` field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum LedgerEvent {
    #[serde(rename_all = "camelCase")]
    DocumentCreated {
        document_id: String,
        creator: String,
        category: u8,
        transaction_hash: String,
        block_number: u64,
    },
    #[serde(rename_all = "camelCase")]
    DocumentVerified {
        document_id: String,
        verifier: String,
        transaction_hash: String,
        block_number: u64,
    },
    #[serde(rename_all = "camelCase")]
    DocumentTransferred {
        document_id: String,
        from: String,
        to: String,
        transaction_hash: String,
        block_number: u64,
    },
    #[serde(rename_all = "camelCase")]
    DocumentRevoked {
        document_id: String,
        revoked_by: String,
        transaction_hash: String,
        block_number: u64,
    },
}

impl LedgerEvent {
    pub fn document_id(&self) -> &str {
        match self {
            Self::DocumentCreated { document_id, .. }
            | Self::DocumentVerified { document_id, .. }
            | Self::DocumentTransferred { document_id, .. }
            | Self::DocumentRevoked { document_id, .. } => document_id,
        }
    }

    pub fn block_number(&self) -> u64 {
        match self {
            Self::DocumentCreated { block_number, .. }
            | Self::DocumentVerified { block_number, .. }
            | Self::DocumentTransferred { block_number, .. }
            | Self::DocumentRevoked { block_number, .. } => *block_number,
        }
    }

    /// Event name as emitted by the registry contract.
    pub fn name(&self) -> &'static str {
        match self {
            Self::DocumentCreated { .. } => "DocumentCreated",
            Self::DocumentVerified { .. } => "DocumentVerified",
            Self::DocumentTransferred { .. } => "DocumentTransferred",
            Self::DocumentRevoked { .. } => "DocumentRevoked",
        }
    }
}

/// A live event subscription.
///
/// Holds the channel fed by the implementation's pump task; dropping the
/// subscription aborts the pump, so a consumer that goes away cannot leak
/// a polling task.
pub struct EventSubscription {
    rx: mpsc::Receiver<LedgerEvent>,
    pump: Option<JoinHandle<()>>,
}

impl EventSubscription {
    /// Build a subscription from a receiver and the task that feeds it.
    pub fn new(rx: mpsc::Receiver<LedgerEvent>, pump: JoinHandle<()>) -> Self {
        Self {
            rx,
            pump: Some(pump),
        }
    }

    /// A subscription fed manually (tests, in-process fakes).
    pub fn from_channel(rx: mpsc::Receiver<LedgerEvent>) -> Self {
        Self { rx, pump: None }
    }

    /// Next event, or `None` once the feeding side has shut down.
    pub async fn recv(&mut self) -> Option<LedgerEvent> {
        self.rx.recv().await
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_deserialize_from_registry_shape() {
        let raw = r#"{
            "event": "DocumentTransferred",
            "documentId": "D1",
            "from": "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
            "to": "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb",
            "transactionHash": "0xfeed",
            "blockNumber": 321
        }"#;
        let event: LedgerEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.document_id(), "D1");
        assert_eq!(event.block_number(), 321);
        assert_eq!(event.name(), "DocumentTransferred");
    }

    #[test]
    fn unknown_event_names_fail_to_parse() {
        let raw = r#"{"event": "DocumentBurned", "documentId": "D1"}"#;
        assert!(serde_json::from_str::<LedgerEvent>(raw).is_err());
    }

    #[tokio::test]
    async fn dropped_subscription_aborts_its_pump() {
        let (tx, rx) = mpsc::channel(8);
        let pump = tokio::spawn(async move {
            // Would run forever if not aborted.
            loop {
                if tx
                    .send(LedgerEvent::DocumentVerified {
                        document_id: "D1".into(),
                        verifier: "0x0".into(),
                        transaction_hash: "0x1".into(),
                        block_number: 1,
                    })
                    .await
                    .is_err()
                {
                    return;
                }
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        });

        let mut sub = EventSubscription::new(rx, pump);
        assert!(sub.recv().await.is_some());
        drop(sub);
        // Nothing to assert beyond not hanging; the abort happens in Drop.
    }
}
