use std::sync::Arc;

use sea_orm::DatabaseConnection;
use services::{dispatch::DispatchBroker, intake::IntakeService};

/// Shared handles for request handlers.
#[derive(Clone)]
pub struct AppState {
    db: DatabaseConnection,
    intake: IntakeService,
}

impl AppState {
    pub fn new(db: DatabaseConnection, broker: Arc<dyn DispatchBroker>) -> Self {
        let intake = IntakeService::new(db.clone(), broker);
        Self { db, intake }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn intake(&self) -> &IntakeService {
        &self.intake
    }
}
