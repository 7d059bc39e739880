//! Scry Meta - the source describing all other sources
//!
//! `/meta/nouns` answers snapshots with the current name → {formats, attrs}
//! mapping and, as the registry's observer, streams add/remove deltas to its
//! subscribers.

mod nouns;

pub use nouns::{NounsSource, NOUNS_NAME};
