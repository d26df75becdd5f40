//! HTTP and WebSocket driver for the listgrab job controller.

pub mod api;
pub mod metrics;
pub mod state;
