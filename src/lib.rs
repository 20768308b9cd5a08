//! Colorizer client
//!
//! Client side of a remote image/video colorization service: multipart
//! submission, task status polling, result download, and a small local
//! history of past colorizations persisted to key-value storage.

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod telemetry;
