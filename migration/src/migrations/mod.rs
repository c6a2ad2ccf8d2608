pub mod m202510010001_create_accounts;
pub mod m202510010002_create_assignments;
pub mod m202510010003_create_submissions;
pub mod m202510010004_create_submission_audits;
pub mod m202510010005_create_dispatch_messages;
