//! Specialized collection types
//!
//! Two containers with different ordering contracts:
//!
//! - [`UpdatePool`]: unordered, O(1) swap-with-last removal. Used for
//!   updateable collections where advancing order does not matter.
//! - [`OrderedBucket`]: insertion-ordered, tombstone-and-compact removal.
//!   Used for shader buckets where draw order must stay stable.
//!
//! Both keep their capacity on `clear()` so the next frame reuses the
//! allocation.

/// Unordered growable pool with swap-with-last removal
#[derive(Debug, Clone)]
pub struct UpdatePool<T> {
    items: Vec<T>,
}

impl<T> UpdatePool<T> {
    /// Create an empty pool
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Create a pool with pre-allocated capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
        }
    }

    /// Append an item, amortized O(1)
    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    /// Insert an item so it is visited first on the next pass
    pub fn push_front(&mut self, item: T) {
        self.items.insert(0, item);
    }

    /// Remove the item at `index` by moving the last item into its place
    pub fn swap_remove_at(&mut self, index: usize) -> Option<T> {
        if index < self.items.len() {
            Some(self.items.swap_remove(index))
        } else {
            None
        }
    }

    /// Visit every item once, removing those for which `keep` returns false
    ///
    /// Removal swaps the last item into the current slot and revisits that
    /// slot, so no remaining item is skipped or visited twice in the pass.
    pub fn retain_cursor(&mut self, mut keep: impl FnMut(&mut T) -> bool) {
        let mut index = 0;
        while index < self.items.len() {
            if keep(&mut self.items[index]) {
                index += 1;
            } else {
                self.items.swap_remove(index);
            }
        }
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check whether the pool is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Allocated capacity
    pub fn capacity(&self) -> usize {
        self.items.capacity()
    }

    /// Item at `index`
    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    /// Iterate over the items in their current order
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Reset the logical size to zero without releasing capacity
    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T: PartialEq> UpdatePool<T> {
    /// Remove the first item equal to `item` using swap-with-last
    pub fn remove(&mut self, item: &T) -> Option<T> {
        let index = self.items.iter().position(|candidate| candidate == item)?;
        Some(self.items.swap_remove(index))
    }

    /// Check whether the pool contains `item`
    pub fn contains(&self, item: &T) -> bool {
        self.items.contains(item)
    }
}

impl<T: Clone> UpdatePool<T> {
    /// Owned copy of the current contents, safe to iterate while the pool changes
    pub fn snapshot(&self) -> Vec<T> {
        self.items.clone()
    }
}

impl<T> Default for UpdatePool<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Insertion-ordered bucket with tombstone-and-compact removal
#[derive(Debug, Clone)]
pub struct OrderedBucket<T> {
    slots: Vec<Option<T>>,
    tombstones: usize,
}

impl<T> OrderedBucket<T> {
    /// Create an empty bucket
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            tombstones: 0,
        }
    }

    /// Create a bucket with pre-allocated capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            tombstones: 0,
        }
    }

    /// Append an item after every existing item
    pub fn push(&mut self, item: T) {
        self.slots.push(Some(item));
    }

    /// Number of live items
    pub fn len(&self) -> usize {
        self.slots.len() - self.tombstones
    }

    /// Check whether the bucket holds no live items
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Allocated capacity
    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    /// Iterate over live items in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().flatten()
    }

    /// Drop tombstones while keeping the relative order of live items
    pub fn compact(&mut self) {
        if self.tombstones > 0 {
            self.slots.retain(Option::is_some);
            self.tombstones = 0;
        }
    }

    /// Visit live items in insertion order, dropping those for which `keep` returns false
    pub fn retain(&mut self, mut keep: impl FnMut(&mut T) -> bool) {
        for slot in &mut self.slots {
            if let Some(item) = slot {
                if !keep(item) {
                    *slot = None;
                    self.tombstones += 1;
                }
            }
        }
        self.compact();
    }

    /// Move every live item out in insertion order, leaving the bucket empty
    pub fn take_all(&mut self) -> Vec<T> {
        self.tombstones = 0;
        self.slots.drain(..).flatten().collect()
    }

    /// Reset the logical size to zero without releasing capacity
    pub fn clear(&mut self) {
        self.slots.clear();
        self.tombstones = 0;
    }
}

impl<T: PartialEq> OrderedBucket<T> {
    /// Tombstone the first live item equal to `item`
    pub fn remove(&mut self, item: &T) -> bool {
        let found = self
            .slots
            .iter()
            .position(|slot| slot.as_ref() == Some(item));

        match found {
            Some(index) => {
                self.slots[index] = None;
                self.tombstones += 1;
                true
            }
            None => false,
        }
    }

    /// Check whether the bucket contains `item`
    pub fn contains(&self, item: &T) -> bool {
        self.iter().any(|candidate| candidate == item)
    }
}

impl<T: Clone> OrderedBucket<T> {
    /// Owned copy of the live items in insertion order
    pub fn snapshot(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}

impl<T> Default for OrderedBucket<T> {
    fn default() -> Self {
        Self::new()
    }
}
