use tracing::trace;

/// Hands out connection ids. Ids of removed connections are recycled before fresh ids are
///  issued, so ids never wrap around while in use.
///
/// Id 0 is reserved for system packets and is never issued.
pub struct ConnectionIdAllocator {
    /// next never-issued id, `None` when all of them are taken
    next_fresh_id: Option<u16>,
    free_list: Vec<u16>,
}

impl Default for ConnectionIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionIdAllocator {
    pub fn new() -> ConnectionIdAllocator {
        ConnectionIdAllocator {
            next_fresh_id: Some(1),
            free_list: Vec::new(),
        }
    }

    /// Returns `None` if all ids are in use
    pub fn allocate(&mut self) -> Option<u16> {
        if let Some(recycled) = self.free_list.pop() {
            trace!("reusing connection id {}", recycled);
            return Some(recycled);
        }

        let fresh = self.next_fresh_id?;
        self.next_fresh_id = fresh.checked_add(1);
        Some(fresh)
    }

    /// Must be called only after the connection with this id is fully removed
    pub fn release(&mut self, connection_id: u16) {
        debug_assert!(connection_id != 0);
        debug_assert!(!self.free_list.contains(&connection_id), "connection id {} released twice", connection_id);
        self.free_list.push(connection_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_ids() {
        let mut allocator = ConnectionIdAllocator::new();
        assert_eq!(allocator.allocate(), Some(1));
        assert_eq!(allocator.allocate(), Some(2));
        assert_eq!(allocator.allocate(), Some(3));
    }

    #[test]
    fn test_recycled_before_fresh() {
        let mut allocator = ConnectionIdAllocator::new();
        for _ in 0..5 {
            allocator.allocate();
        }
        allocator.release(3);
        assert_eq!(allocator.allocate(), Some(3));
        assert_eq!(allocator.allocate(), Some(6));
    }

    #[test]
    fn test_most_recently_released_first() {
        let mut allocator = ConnectionIdAllocator::new();
        for _ in 0..5 {
            allocator.allocate();
        }
        allocator.release(2);
        allocator.release(4);
        assert_eq!(allocator.allocate(), Some(4));
        assert_eq!(allocator.allocate(), Some(2));
        assert_eq!(allocator.allocate(), Some(6));
    }

    #[test]
    fn test_exhaustion() {
        let mut allocator = ConnectionIdAllocator::new();
        for expected in 1..=u16::MAX {
            assert_eq!(allocator.allocate(), Some(expected));
        }
        assert_eq!(allocator.allocate(), None);
        assert_eq!(allocator.allocate(), None);

        allocator.release(17);
        assert_eq!(allocator.allocate(), Some(17));
        assert_eq!(allocator.allocate(), None);
    }
}
