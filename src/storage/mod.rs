//! Storage Module
//!
//! Segment lifecycle on top of the single-file [`Segment`](crate::data::Segment).
//!
//! ## Responsibilities
//! - Discover existing segment files on startup
//! - Keep exactly one active (appendable) segment
//! - Roll over to a fresh segment when the active one is full
//! - Route positional reads to the owning segment
//!
//! ## Directory Layout
//! ```text
//! {dir}/
//!   ├── 000000000.data   (older, read-only)
//!   ├── 000000001.data   (older, read-only)
//!   └── 000000002.data   (active)
//! ```

mod manager;

pub use manager::SegmentManager;
