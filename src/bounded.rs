//! Fixed-capacity arenas for per-frame submissions

/// A pre-allocated queue that never grows.
///
/// Items past capacity are dropped and counted; the count resets with [`clear`](Self::clear).
#[derive(Debug, Clone)]
pub struct BoundedQueue<T> {
    items: Vec<T>,
    capacity: usize,
    dropped: usize,
}

impl<T> BoundedQueue<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    /// Append an item, returning `false` if the queue was full
    pub fn push(&mut self, item: T) -> bool {
        if self.items.len() >= self.capacity {
            self.dropped += 1;
            return false;
        }
        self.items.push(item);
        true
    }

    /// Reset the length to zero, keeping the allocation
    pub fn clear(&mut self) {
        self.items.clear();
        self.dropped = 0;
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Items rejected since the last clear
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }
}

impl<'a, T> IntoIterator for &'a BoundedQueue<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overflow_keeps_first_items() {
        let mut queue = BoundedQueue::with_capacity(3);
        let kept: Vec<bool> = (0..5).map(|i| queue.push(i)).collect();

        assert_eq!(kept, vec![true, true, true, false, false]);
        assert_eq!(queue.as_slice(), &[0, 1, 2]);
        assert_eq!(queue.dropped(), 2);
        assert!(queue.is_full());
    }

    #[test]
    fn test_clear_keeps_allocation() {
        let mut queue = BoundedQueue::with_capacity(16);
        for i in 0..20 {
            queue.push(i);
        }
        let before = queue.items.capacity();
        queue.clear();

        assert!(queue.is_empty());
        assert_eq!(queue.dropped(), 0);
        assert_eq!(queue.items.capacity(), before);
    }

    #[test]
    fn test_zero_capacity_rejects_everything() {
        let mut queue = BoundedQueue::with_capacity(0);
        assert!(!queue.push(1u8));
        assert_eq!(queue.len(), 0);
    }
}
