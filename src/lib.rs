//! Posts a user's daily GitHub commit count to Bluesky.
//!
//! The [`uploader`] module holds the post-dispatch pipeline; the rest of the
//! crate provides its configuration, persistence and input handling.

pub mod config;
pub mod database;
pub mod errors;
pub mod image_processor;
pub mod runner;
pub mod security;
pub mod uploader;
