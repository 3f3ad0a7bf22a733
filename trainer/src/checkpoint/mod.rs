mod manager;

pub use manager::{CHECKPOINT_PREFIX, CheckpointManager, INDEX_FILE, restore};
