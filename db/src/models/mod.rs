pub mod account;
pub mod assignment;
pub mod dispatch_message;
pub mod submission;
pub mod submission_audit;

pub use account::Entity as Account;
pub use assignment::Entity as Assignment;
pub use dispatch_message::Entity as DispatchMessage;
pub use submission::Entity as Submission;
pub use submission_audit::Entity as SubmissionAudit;
