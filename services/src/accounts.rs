//! Account provisioning from a CSV file.
//!
//! The file carries a header row with `email`, `password`, `first_name` and
//! `last_name`. Loading is idempotent: accounts are matched by email and an
//! existing account is never modified.

use db::models::account;
use sea_orm::{DatabaseConnection, DbErr};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed account row: {0}")]
    Csv(#[from] csv::Error),
    #[error("row {row}: email must not be empty")]
    MissingEmail { row: usize },
    #[error("ledger error: {0}")]
    Database(#[from] DbErr),
}

#[derive(Debug, Deserialize)]
struct AccountRow {
    email: String,
    password: String,
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProvisionReport {
    pub created: usize,
    pub existing: usize,
}

/// Creates every account listed in the CSV file at `path` that does not exist yet.
///
/// The whole file is parsed before anything is written, so a malformed row
/// provisions nothing.
pub async fn provision_from_csv(
    db: &DatabaseConnection,
    path: &Path,
) -> Result<ProvisionReport, ProvisionError> {
    let raw = tokio::fs::read(path).await.map_err(|source| ProvisionError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let rows = parse_rows(&raw)?;

    let mut report = ProvisionReport::default();
    for row in rows {
        let (account, created) = account::Model::find_or_create(
            db,
            &row.email,
            &row.password,
            &row.first_name,
            &row.last_name,
        )
        .await?;

        if created {
            report.created += 1;
            debug!(account_id = %account.id, email = %account.email, "Account provisioned");
        } else {
            report.existing += 1;
        }
    }

    info!(
        path = %path.display(),
        created = report.created,
        existing = report.existing,
        "Accounts loaded"
    );
    Ok(report)
}

fn parse_rows(raw: &[u8]) -> Result<Vec<AccountRow>, ProvisionError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(raw);

    let mut rows = Vec::new();
    for (index, record) in reader.deserialize::<AccountRow>().enumerate() {
        let row = record?;
        if row.email.is_empty() {
            // Header is line 1.
            return Err(ProvisionError::MissingEmail { row: index + 2 });
        }
        rows.push(row);
    }
    Ok(rows)
}
