use serde::{Deserialize, Serialize};

/// Packing input: position, order and character length of one dialog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderLen {
    /// Index into the meeting's dialog array
    pub idx: usize,
    /// Dialog order
    pub order: u64,
    /// Character length of the original text
    pub len: usize,
}

/// A contiguous, order-preserving group of dialogs bounded by a character
/// threshold. An `oversized` pack holds exactly one dialog whose length alone
/// exceeds the threshold; dialogs are never split.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pack {
    /// Indices into the dialog array, ascending
    pub indices: Vec<usize>,
    /// Orders of the contained dialogs, ascending
    pub orders: Vec<u64>,
    /// Sum of contained character lengths
    pub total_len: usize,
    /// True when a single dialog exceeded the threshold on its own
    pub oversized: bool,
}

impl Pack {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}
