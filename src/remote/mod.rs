// ABOUTME: HTTP-backed status sources
// ABOUTME: Reads platform status export endpoints and hands raw records to collectors

pub mod client;
pub mod models;

pub use client::{HttpStatusSource, DEFAULT_REQUEST_TIMEOUT};
pub use models::{extract_page, Continuation, Page};
