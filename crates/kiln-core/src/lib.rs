//! # kiln-core
//!
//! Foundation types for the kiln streaming client.
//!
//! This crate provides the shared vocabulary the rest of the workspace
//! depends on:
//!
//! - **Branded IDs**: [`ids::PromptId`] and [`ids::ListenerId`] newtypes
//! - **Events**: [`events::PromptEvent`] and its [`events::EventKind`] tags
//! - **Errors**: [`errors::KilnError`] hierarchy via `thiserror`
//! - **Backoff**: [`retry::BackoffConfig`] and the reconnect delay math
//! - **Limits**: the security constants in [`constants`]

#![deny(unsafe_code)]

pub mod constants;
pub mod errors;
pub mod events;
pub mod ids;
pub mod retry;
