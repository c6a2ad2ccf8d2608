pub mod accounts;
pub mod archive;
pub mod dispatch;
pub mod fetch;
pub mod intake;
pub mod notify;
pub mod policy;
pub mod worker;
