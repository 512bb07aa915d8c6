use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use ludo_types::PlayerId;

/// Half the `u32` space: the widest gap still read as "newer".
const HALF_RANGE: u32 = 1 << 31;

/// Whether wrapping sequence `s1` is newer than `s2`.
/// sequence_greater_than(2, 1) is true
/// sequence_greater_than(0, u32::MAX) is true
/// sequence_greater_than(1, 1) is false
pub fn sequence_greater_than(s1: u32, s2: u32) -> bool {
    ((s1 > s2) && (s1 - s2 <= HALF_RANGE)) || ((s1 < s2) && (s2 - s1 > HALF_RANGE))
}

/// Outgoing sequence numbers for the local sender. The first stamped value is 1.
///
/// Wraps to 0 after `u32::MAX`; receivers compare with [`sequence_greater_than`].
#[derive(Debug, Default)]
pub struct SequenceCounter(AtomicU32);

impl SequenceCounter {
    pub fn starting_at(value: u32) -> Self {
        Self(AtomicU32::new(value))
    }

    pub fn next(&self) -> u32 {
        self.0.fetch_add(1, Ordering::SeqCst).wrapping_add(1)
    }

    /// Last stamped value.
    pub fn current(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Highest sequence number accepted from each remote sender.
#[derive(Debug, Default)]
pub struct SenderWatermarks {
    highest: HashMap<PlayerId, u32>,
}

impl SenderWatermarks {
    /// Record `sequence` from `sender`. Returns `false` for a duplicate or older message.
    pub fn observe(&mut self, sender: &PlayerId, sequence: u32) -> bool {
        match self.highest.get_mut(sender) {
            Some(highest) if !sequence_greater_than(sequence, *highest) => false,
            Some(highest) => {
                *highest = sequence;
                true
            }
            None => {
                self.highest.insert(sender.clone(), sequence);
                true
            }
        }
    }

    /// Forget `sender`; its counter may restart after a reconnect.
    pub fn reset(&mut self, sender: &PlayerId) {
        self.highest.remove(sender);
    }

    pub fn highest(&self, sender: &PlayerId) -> Option<u32> {
        self.highest.get(sender).copied()
    }
}
