//! At-least-once hand-off from intake to the processing worker.
//!
//! Messages are rows in the `dispatch_messages` outbox. A consumer leases a row,
//! runs the handler, and deletes the row on success. A failed or abandoned
//! delivery becomes visible again once its lease runs out.

pub mod message;
pub mod outbox;
pub mod slots;

pub use message::DispatchMessage;
pub use outbox::{OutboxBroker, OutboxSettings, PollOutcome};
pub use slots::{DeliverySlots, SlotStats};

use async_trait::async_trait;
use sea_orm::DbErr;

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("dispatch storage error: {0}")]
    Database(#[from] DbErr),
    #[error("failed to encode dispatch message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Error a handler reports to leave a message for redelivery.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

#[async_trait]
pub trait DispatchBroker: Send + Sync {
    /// Returns once the message is durably enqueued.
    async fn publish(&self, message: &DispatchMessage) -> Result<(), BrokerError>;
}

#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    /// `Ok` acknowledges the delivery. `Err` leaves it to be redelivered.
    async fn handle(&self, message: DispatchMessage) -> Result<(), HandlerError>;
}
