//! Core data model types: provider messages, attachments, metadata, and summaries.

pub mod attachment;
pub mod mail;
pub mod message;
pub mod summary;
