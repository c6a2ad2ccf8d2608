use db::models::submission;
use serde::{Deserialize, Serialize};

/// Payload handed from intake to the worker.
///
/// Field names are the wire contract; a redelivered message is identical to the
/// first delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchMessage {
    pub submission_id: String,
    pub submission_url: String,
    pub assignment_id: String,
    pub submission_email: String,
}

impl DispatchMessage {
    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_payload(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}

impl From<&submission::Model> for DispatchMessage {
    fn from(record: &submission::Model) -> Self {
        Self {
            submission_id: record.id.clone(),
            submission_url: record.submission_url.clone(),
            assignment_id: record.assignment_id.clone(),
            submission_email: record.submitter_email.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::DispatchMessage;
    use serde_json::json;

    #[test]
    fn envelope_field_names() {
        let msg = DispatchMessage {
            submission_id: "s-1".into(),
            submission_url: "https://example.com/hw.zip".into(),
            assignment_id: "a-1".into(),
            submission_email: "s@example.com".into(),
        };

        let value: serde_json::Value = serde_json::from_str(&msg.to_payload().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "submission_id": "s-1",
                "submission_url": "https://example.com/hw.zip",
                "assignment_id": "a-1",
                "submission_email": "s@example.com",
            })
        );
    }

    #[test]
    fn rejects_incomplete_envelope() {
        assert!(DispatchMessage::from_payload(r#"{"submission_id":"s-1"}"#).is_err());
    }
}
