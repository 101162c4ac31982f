// ── Relay state storage ──

pub(crate) mod collection;
pub mod mirror;

pub use collection::Snapshot;
pub use mirror::{MirrorCounts, StateMirror};
