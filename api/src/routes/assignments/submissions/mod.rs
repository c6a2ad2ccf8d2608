pub mod common;
pub mod post;
