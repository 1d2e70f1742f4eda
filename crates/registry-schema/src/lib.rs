//! Registry metadata documents and the time-bounded rewriter.
//!
//! This crate understands the registry's package-metadata document shape
//! (`versions`, `time`, `dist-tags`) and knows how to edit one so that it
//! looks as if no publication ever happened after a cutoff instant.

pub mod document;
pub mod rewriter;
pub mod timeline;

#[cfg(test)]
mod rewriter_props;

pub use document::is_reserved_time_key;
pub use rewriter::rewrite_document;
pub use timeline::{collect_events, merge_timeline, TimelineEvent};
