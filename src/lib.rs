//! Turnstile - In-Memory Admission Control Service
//!
//! This crate decides, per client identity, whether a request may proceed
//! or must be rejected. Limits are enforced in process memory by one of four
//! interchangeable strategies (fixed count, timed window, sliding log, token
//! bucket) behind a single admission interface, and served over HTTP.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
