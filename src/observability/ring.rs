//! Fixed-capacity circular buffer backing the per-type debug ring buffers.

use std::collections::VecDeque;

/// A circular buffer of the last `capacity` items pushed, in chronological
/// order. Write is O(1) amortized; resizing wipes existing contents.
#[derive(Debug, Clone)]
pub(crate) struct RingBuffer<T> {
    capacity: usize,
    buf: VecDeque<T>,
}

impl<T> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            buf: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    pub fn push(&mut self, item: T) {
        if self.buf.len() >= self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(item);
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

impl<T: Clone> RingBuffer<T> {
    pub fn entries(&self) -> Vec<T> {
        self.buf.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn keeps_last_n_entries_in_chronological_order() {
        let mut rb = RingBuffer::new(3);
        for i in 0..5 {
            rb.push(format!("p-{i}"));
        }
        assert_eq!(rb.entries(), vec!["p-2", "p-3", "p-4"]);
    }

    #[test]
    fn resize_wipes_contents() {
        let mut rb = RingBuffer::new(3);
        rb.push(1);
        rb.push(2);
        let mut resized = RingBuffer::new(5);
        std::mem::swap(&mut rb, &mut resized);
        assert!(rb.entries().is_empty());
    }

    proptest! {
        /// However many items are pushed, the buffer never holds more than
        /// its capacity, and what it does hold is always the chronological
        /// suffix of everything ever pushed.
        #[test]
        fn never_exceeds_capacity_and_keeps_the_trailing_suffix(
            capacity in 1usize..20,
            pushed in proptest::collection::vec(0i32..1000, 0..60)
        ) {
            let mut rb = RingBuffer::new(capacity);
            for v in &pushed {
                rb.push(*v);
            }
            let entries = rb.entries();
            prop_assert!(entries.len() <= capacity);

            let expected_len = pushed.len().min(capacity);
            let expected: Vec<i32> = pushed[pushed.len() - expected_len..].to_vec();
            prop_assert_eq!(entries, expected);
        }
    }
}
