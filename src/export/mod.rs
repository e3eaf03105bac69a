//! Writing attachments to disk: collision-free naming, downloading, and summaries.

pub mod download;
pub mod naming;
pub mod summary;
