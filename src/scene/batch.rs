//! Per-texture draw batches rebuilt every frame

use std::collections::HashMap;

use glam::Mat4;

use crate::backend::BufferHandle;
use crate::bounded::BoundedQueue;
use crate::scene::TextureKey;

/// Items per texture key
pub const BATCH_CAPACITY: usize = 1024;

/// Items for the designated ground key
pub const GROUND_BATCH_CAPACITY: usize = 64;

/// One draw of a mesh range with a world transform
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchItem {
    pub world: Mat4,
    pub vertex_buffer: BufferHandle,
    pub index_buffer: Option<BufferHandle>,
    pub start_index: u32,
    pub primitive_count: u32,
}

impl BatchItem {
    pub fn is_indexed(&self) -> bool {
        self.index_buffer.is_some()
    }

    /// Index (or vertex) range covered by the item, three per triangle
    pub fn range(&self) -> std::ops::Range<u32> {
        self.start_index..self.start_index.saturating_add(self.primitive_count.saturating_mul(3))
    }
}

/// Texture key to fixed-capacity batch registry.
///
/// Arrays are allocated the first time a key is seen and kept for the lifetime of
/// the registry; clearing only resets their lengths.
#[derive(Debug, Default)]
pub struct BatchRegistry {
    batches: HashMap<TextureKey, BoundedQueue<BatchItem>>,
    order: Vec<TextureKey>,
    ground_key: Option<TextureKey>,
}

impl BatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn capacity_for(&self, key: TextureKey) -> usize {
        if self.ground_key == Some(key) {
            GROUND_BATCH_CAPACITY
        } else {
            BATCH_CAPACITY
        }
    }

    /// Pre-allocate the array for `key`
    pub fn register(&mut self, key: TextureKey) {
        if !self.batches.contains_key(&key) {
            let capacity = self.capacity_for(key);
            self.batches.insert(key, BoundedQueue::with_capacity(capacity));
            self.order.push(key);
        }
    }

    /// Designate the terrain key, which gets the smaller array.
    ///
    /// Items already queued under either key are kept, up to the new capacity.
    pub fn set_ground_key(&mut self, key: TextureKey) {
        let previous = self.ground_key.replace(key);
        if let Some(previous) = previous.filter(|previous| *previous != key) {
            self.resize_batch(previous, BATCH_CAPACITY);
        }
        if self.batches.contains_key(&key) {
            self.resize_batch(key, GROUND_BATCH_CAPACITY);
        } else {
            self.register(key);
        }
    }

    fn resize_batch(&mut self, key: TextureKey, capacity: usize) {
        let Some(batch) = self.batches.get_mut(&key) else {
            return;
        };
        if batch.capacity() == capacity {
            return;
        }
        let mut resized = BoundedQueue::with_capacity(capacity);
        for item in batch.iter() {
            resized.push(*item);
        }
        if resized.dropped() > 0 {
            log::debug!("Batch {:?} shrunk to {}, dropped {} items", key, capacity, resized.dropped());
        }
        *batch = resized;
    }

    pub fn ground_key(&self) -> Option<TextureKey> {
        self.ground_key
    }

    /// Reset every array to length zero without deallocating
    pub fn clear_batches(&mut self) {
        for batch in self.batches.values_mut() {
            batch.clear();
        }
    }

    /// Append an item under `key`, returning `false` when that key's array is full
    pub fn add_item(&mut self, key: TextureKey, item: BatchItem) -> bool {
        self.register(key);
        match self.batches.get_mut(&key) {
            Some(batch) => {
                let kept = batch.push(item);
                if !kept {
                    log::trace!("Batch {:?} full, dropping item", key);
                }
                kept
            }
            None => false,
        }
    }

    pub fn batch(&self, key: TextureKey) -> Option<&BoundedQueue<BatchItem>> {
        self.batches.get(&key)
    }

    /// Non-empty batches in first-seen key order
    pub fn iter(&self) -> impl Iterator<Item = (TextureKey, &BoundedQueue<BatchItem>)> {
        self.order.iter().filter_map(move |key| {
            self.batches
                .get(key)
                .filter(|batch| !batch.is_empty())
                .map(|batch| (*key, batch))
        })
    }

    pub fn key_count(&self) -> usize {
        self.order.len()
    }

    pub fn item_count(&self) -> usize {
        self.batches.values().map(|b| b.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> BatchItem {
        BatchItem {
            world: Mat4::IDENTITY,
            vertex_buffer: BufferHandle(1),
            index_buffer: None,
            start_index: 0,
            primitive_count: 2,
        }
    }

    #[test]
    fn test_keys_iterate_in_first_seen_order() {
        let mut registry = BatchRegistry::new();
        registry.add_item(TextureKey(7), item());
        registry.add_item(TextureKey(3), item());
        registry.add_item(TextureKey(7), item());

        let keys: Vec<_> = registry.iter().map(|(k, b)| (k, b.len())).collect();
        assert_eq!(keys, vec![(TextureKey(7), 2), (TextureKey(3), 1)]);
    }

    #[test]
    fn test_clear_keeps_keys_and_skips_empty() {
        let mut registry = BatchRegistry::new();
        registry.register(TextureKey(1));
        registry.add_item(TextureKey(2), item());
        registry.clear_batches();

        assert_eq!(registry.key_count(), 2);
        assert_eq!(registry.iter().count(), 0);
        assert_eq!(registry.item_count(), 0);
    }

    #[test]
    fn test_ground_key_capped() {
        let mut registry = BatchRegistry::new();
        registry.add_item(TextureKey(9), item());
        registry.set_ground_key(TextureKey(9));

        // the item added before designation still counts
        let kept = (0..100)
            .filter(|_| registry.add_item(TextureKey(9), item()))
            .count();
        assert_eq!(kept, GROUND_BATCH_CAPACITY - 1);
        assert_eq!(registry.batch(TextureKey(9)).map(|b| b.len()), Some(GROUND_BATCH_CAPACITY));
    }

    #[test]
    fn test_ground_key_keeps_queued_items() {
        let mut registry = BatchRegistry::new();
        let mut first = item();
        first.start_index = 42;
        registry.add_item(TextureKey(4), first);
        registry.add_item(TextureKey(4), item());
        registry.set_ground_key(TextureKey(4));

        let batch = registry.batch(TextureKey(4)).unwrap();
        assert_eq!(batch.capacity(), GROUND_BATCH_CAPACITY);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.as_slice()[0].start_index, 42);
    }

    #[test]
    fn test_moving_ground_key_restores_capacity() {
        let mut registry = BatchRegistry::new();
        registry.set_ground_key(TextureKey(1));
        registry.add_item(TextureKey(1), item());
        registry.set_ground_key(TextureKey(2));

        assert_eq!(registry.ground_key(), Some(TextureKey(2)));
        let old = registry.batch(TextureKey(1)).unwrap();
        assert_eq!(old.capacity(), BATCH_CAPACITY);
        assert_eq!(old.len(), 1);
        assert_eq!(
            registry.batch(TextureKey(2)).map(|b| b.capacity()),
            Some(GROUND_BATCH_CAPACITY)
        );

        let kept = (0..BATCH_CAPACITY)
            .filter(|_| registry.add_item(TextureKey(1), item()))
            .count();
        assert_eq!(kept, BATCH_CAPACITY - 1);
    }

    #[test]
    fn test_regular_key_capped() {
        let mut registry = BatchRegistry::new();
        let kept = (0..BATCH_CAPACITY + 10)
            .filter(|_| registry.add_item(TextureKey(0), item()))
            .count();
        assert_eq!(kept, BATCH_CAPACITY);
        assert_eq!(registry.batch(TextureKey(0)).map(|b| b.dropped()), Some(10));
    }

    #[test]
    fn test_item_range_counts_triangles() {
        let mut indexed = item();
        indexed.start_index = 6;
        indexed.index_buffer = Some(BufferHandle(2));
        assert!(indexed.is_indexed());
        assert_eq!(indexed.range(), 6..12);
    }

    #[test]
    fn test_item_range_saturates() {
        let mut huge = item();
        huge.start_index = u32::MAX - 1;
        huge.primitive_count = u32::MAX;
        assert_eq!(huge.range(), u32::MAX - 1..u32::MAX);
    }
}
