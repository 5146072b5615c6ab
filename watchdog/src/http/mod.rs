//! HTTP session plumbing shared by the checker and the notifier.

mod client;

pub use client::{HttpClient, HttpOptions, DEFAULT_HEADERS};
