use super::{
    BrokerError, DeliveryHandler, DeliverySlots, DispatchBroker, DispatchMessage, SlotStats,
};
use async_trait::async_trait;
use chrono::Utc;
use db::models::dispatch_message;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use util::config::AppConfig;

/// How many candidate rows one claim attempt looks at.
const CLAIM_BATCH: u64 = 32;

#[derive(Debug, Clone)]
pub struct OutboxSettings {
    pub topic: String,
    /// How long a claimed delivery stays invisible to other consumers.
    pub lease: Duration,
    pub poll_interval: Duration,
    /// Deliveries after which a message is dead-lettered instead of retried.
    pub max_deliveries: u32,
    pub concurrency: usize,
}

impl OutboxSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            topic: config.dispatch_topic.clone(),
            lease: config.dispatch_lease(),
            poll_interval: config.dispatch_poll_interval(),
            max_deliveries: config.dispatch_max_deliveries,
            concurrency: config.worker_concurrency,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing was available.
    Idle,
    /// Handled and acknowledged.
    Acked(String),
    /// The handler failed; the message will come back after its lease.
    Released(String),
}

struct Delivery {
    row: dispatch_message::Model,
    message: DispatchMessage,
}

pub struct OutboxBroker {
    db: DatabaseConnection,
    settings: OutboxSettings,
    slots: DeliverySlots,
}

impl OutboxBroker {
    pub fn new(db: DatabaseConnection, settings: OutboxSettings) -> Self {
        let slots = DeliverySlots::new(settings.concurrency);
        Self { db, settings, slots }
    }

    pub fn settings(&self) -> &OutboxSettings {
        &self.settings
    }

    pub fn stats(&self) -> SlotStats {
        self.slots.stats()
    }

    /// Messages still waiting for a successful delivery.
    pub async fn live_count(&self) -> Result<u64, BrokerError> {
        Ok(dispatch_message::Model::count_live(&self.db, &self.settings.topic).await?)
    }

    pub async fn dead_letter_count(&self) -> Result<u64, BrokerError> {
        Ok(dispatch_message::Model::count_dead_lettered(&self.db, &self.settings.topic).await?)
    }

    /// Claim and handle at most one message on the calling task.
    pub async fn poll_once<H>(&self, handler: &H) -> Result<PollOutcome, BrokerError>
    where
        H: DeliveryHandler + ?Sized,
    {
        match self.claim_next().await? {
            Some(delivery) => self.deliver(delivery, handler).await,
            None => Ok(PollOutcome::Idle),
        }
    }

    /// Start consuming in the background until `cancel` fires.
    ///
    /// At most `concurrency` deliveries run at once. Deliveries already running
    /// when the token fires are left to finish; see [`OutboxBroker::drain`].
    pub fn subscribe<H>(
        self: Arc<Self>,
        handler: Arc<H>,
        cancel: CancellationToken,
    ) -> JoinHandle<()>
    where
        H: DeliveryHandler + ?Sized + 'static,
    {
        tokio::spawn(async move { self.consume(handler, cancel).await })
    }

    /// Wait for running deliveries to finish, up to `timeout`.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let wait = async {
            while self.slots.stats().running > 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }

    async fn consume<H>(self: Arc<Self>, handler: Arc<H>, cancel: CancellationToken)
    where
        H: DeliveryHandler + ?Sized + 'static,
    {
        info!(
            topic = %self.settings.topic,
            concurrency = self.settings.concurrency,
            "Dispatch consumer started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.slots.acquire() => {}
            }

            match self.claim_next().await {
                Ok(Some(delivery)) => {
                    let broker = Arc::clone(&self);
                    let handler = Arc::clone(&handler);
                    tokio::spawn(async move {
                        if let Err(e) = broker.deliver(delivery, handler.as_ref()).await {
                            error!(error = %e, "Failed to acknowledge delivery");
                        }
                        broker.slots.release();
                    });
                    continue;
                }
                Ok(None) => self.slots.release(),
                Err(e) => {
                    self.slots.release();
                    error!(error = %e, "Failed to claim dispatch message");
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }

        info!(topic = %self.settings.topic, "Dispatch consumer stopped");
    }

    async fn claim_next(&self) -> Result<Option<Delivery>, BrokerError> {
        let now = Utc::now();
        let lease = chrono::Duration::from_std(self.settings.lease)
            .unwrap_or_else(|_| chrono::Duration::seconds(300));
        let max_deliveries = i64::from(self.settings.max_deliveries);

        let candidates =
            dispatch_message::Model::deliverable(&self.db, &self.settings.topic, now, CLAIM_BATCH)
                .await?;

        for row in candidates {
            if i64::from(row.deliveries) >= max_deliveries {
                if row.dead_letter(&self.db, now).await? {
                    error!(
                        message_id = row.id,
                        submission_id = %row.submission_id,
                        deliveries = row.deliveries,
                        "Dispatch message dead-lettered after repeated failed deliveries"
                    );
                }
                continue;
            }

            let message = match DispatchMessage::from_payload(&row.payload) {
                Ok(message) => message,
                Err(e) => {
                    if row.dead_letter(&self.db, now).await? {
                        error!(
                            message_id = row.id,
                            error = %e,
                            "Dispatch message dead-lettered, payload is not a valid envelope"
                        );
                    }
                    continue;
                }
            };

            if let Some(leased) = row.try_lease(&self.db, now + lease).await? {
                debug!(
                    message_id = leased.id,
                    submission_id = %message.submission_id,
                    delivery = leased.deliveries,
                    "Claimed dispatch message"
                );
                return Ok(Some(Delivery {
                    row: leased,
                    message,
                }));
            }
        }

        Ok(None)
    }

    async fn deliver<H>(&self, delivery: Delivery, handler: &H) -> Result<PollOutcome, BrokerError>
    where
        H: DeliveryHandler + ?Sized,
    {
        let submission_id = delivery.message.submission_id.clone();

        match handler.handle(delivery.message).await {
            Ok(()) => {
                dispatch_message::Model::ack(&self.db, delivery.row.id).await?;
                debug!(message_id = delivery.row.id, %submission_id, "Acknowledged delivery");
                Ok(PollOutcome::Acked(submission_id))
            }
            Err(e) => {
                warn!(
                    message_id = delivery.row.id,
                    %submission_id,
                    delivery = delivery.row.deliveries,
                    error = %e,
                    "Delivery failed, message will be redelivered after its lease"
                );
                Ok(PollOutcome::Released(submission_id))
            }
        }
    }
}

#[async_trait]
impl DispatchBroker for OutboxBroker {
    async fn publish(&self, message: &DispatchMessage) -> Result<(), BrokerError> {
        let payload = message.to_payload()?;
        let row = dispatch_message::Model::enqueue(
            &self.db,
            &self.settings.topic,
            &message.submission_id,
            &payload,
        )
        .await?;
        debug!(message_id = row.id, submission_id = %message.submission_id, "Published dispatch message");
        Ok(())
    }
}
