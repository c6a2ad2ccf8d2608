#![allow(dead_code)]

pub mod app;

pub use app::{TestApp, basic_auth, json_body, make_test_app};
