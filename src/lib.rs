//! Screenshot Vision
//!
//! This library provides the core functionality for the screenshot-vision
//! system: an asynchronous pipeline that queues screenshot images for
//! AI-based visual analysis via Azure AI Vision, tracks per-job lifecycle
//! state, retries transient provider failures, stores results keyed by
//! screenshot, and notifies observers of completions.

pub mod app_state;
pub mod config;
pub mod models;
pub mod pipeline;
pub mod routes;
pub mod services;
