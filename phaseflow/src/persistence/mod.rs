//! Crash-safe snapshots of pipeline state.
//!
//! One JSON document per run at `<output_dir>/<run_id>.json`, written by
//! temp file and rename so a crash never leaves a torn snapshot.

mod store;

pub use store::{StateStore, HISTORY_DIR, SNAPSHOT_HASH_PREFIX_LEN};
