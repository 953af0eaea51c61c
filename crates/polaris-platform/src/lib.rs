//! # polaris-platform
//!
//! The hosting platform as seen by the runner: which event started it, and
//! a GitHub client that serves as both task source and transcript sink.

pub mod event;
pub mod github;

pub use event::{SCHEDULE_LABEL, TriggerEvent};
pub use github::GitHubClient;
