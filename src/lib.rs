//! `pdffetch`: download PDF attachments from a Gmail mailbox.
//!
//! This crate provides the attachment discovery and file-naming pipeline,
//! the Gmail collaborator it runs against, and a small HTTP job service that
//! runs the same pipeline in the background.

pub mod config;
pub mod error;
pub mod export;
pub mod fetch;
pub mod gmail;
pub mod model;
pub mod parser;
pub mod server;
