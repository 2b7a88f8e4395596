//! Test helpers for locus-server.

#![allow(dead_code, unused_imports)]

pub mod app;
pub mod client;

pub use app::{FIXTURE, TestApp, test_app, test_app_with};
pub use client::{TestClient, TestResponse};
