use rustc_hash::FxHashMap;
use tracing::warn;
use crate::safe_converter::SafeCast;

/// Collects the fragments of a single fragmented message until all of them are present.
///
/// The fragmented message id is only 8 bits wide, so a message is identified by its base
///  message id (the reliable message id of fragment 0) together with the fragment count.
pub struct FragmentReassembler {
    base_message_id: u16,
    expected_fragments: u8,
    fragments: FxHashMap<u8, Vec<u8>>,
}

impl FragmentReassembler {
    pub fn new(base_message_id: u16, expected_fragments: u8) -> FragmentReassembler {
        FragmentReassembler {
            base_message_id,
            expected_fragments,
            fragments: Default::default(),
        }
    }

    pub fn base_message_id(&self) -> u16 {
        self.base_message_id
    }

    /// `false` if a fragment belongs to a different message that reuses the same fragmented
    ///  message id
    pub fn belongs_to(&self, base_message_id: u16, num_fragments: u8) -> bool {
        self.base_message_id == base_message_id && self.expected_fragments == num_fragments
    }

    pub fn is_complete(&self) -> bool {
        self.fragments.len() == self.expected_fragments.safe_cast()
    }

    /// Adds a fragment, returning `true` if the message is complete afterwards. Fragments that
    ///  were added before are ignored, and so are indices outside the expected fragment count.
    pub fn add_fragment(&mut self, index: u8, data: Vec<u8>) -> bool {
        if index >= self.expected_fragments {
            warn!("fragment index {} is out of range for a message with {} fragments - ignoring", index, self.expected_fragments);
            return self.is_complete();
        }
        self.fragments.entry(index)
            .or_insert(data);
        self.is_complete()
    }

    /// Concatenates all fragments in index order.
    ///
    /// Panics if the message is not complete - callers must check this first
    pub fn reassemble(mut self) -> Vec<u8> {
        assert!(self.is_complete(), "reassembling an incomplete fragmented message");

        let total_len = self.fragments.values()
            .map(|f| f.len())
            .sum();
        let mut result = Vec::with_capacity(total_len);
        for index in 0..self.expected_fragments {
            let fragment = self.fragments.remove(&index)
                .expect("a complete message should have all fragment indices");
            result.extend_from_slice(&fragment);
        }
        result
    }
}
