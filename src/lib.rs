//! Personal prompt collection with per-edit history and pluggable remote
//! sync.
//!
//! [`prompts::store::PromptStore`] owns the collection and writes it through
//! a [`prompts::repository::PromptRepository`] on every change.
//! [`sync::coordinator::SyncCoordinator`] pushes the collection to the active
//! [`sync::SyncProvider`] and adopts whatever the remote holds afterwards.

pub mod config;
pub mod prompts;
pub mod sync;
