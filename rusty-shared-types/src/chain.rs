use serde::{Deserialize, Serialize};

/// A block index entry as seen by the sync logic: its height and block time
/// (unix seconds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockTip {
    pub height: u64,
    pub time: u64,
}

impl BlockTip {
    pub fn new(height: u64, time: u64) -> Self {
        BlockTip { height, time }
    }
}
