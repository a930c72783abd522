//! Idempotency-key middleware for axum.
//!
//! See [`idempotency`] for the middleware itself; [`config`], [`application`]
//! and [`infra`] assemble the demo `idemgate` server around it.

pub mod application;
pub mod config;
pub mod idempotency;
pub mod infra;
