//! Message inspection: attachment discovery, header metadata, and date parsing.

pub mod attachments;
pub mod date;
pub mod metadata;
