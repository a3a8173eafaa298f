// src/lib.rs

//! pushwatch: watch one source, push what is new.
//!
//! A run fetches the configured source, normalizes it into identity-keyed
//! records, compares them with the keys already announced in the current
//! window and pushes a message when something new appeared. State is only
//! committed after the push succeeds.

pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
