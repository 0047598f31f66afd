// Copyright 2023 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! A fixed-capacity arena with an index-threaded free list.
//!
//! Records never move once acquired: the arena is a plain `Vec<Slot<T>>`
//! sized once at construction, and `acquire`/`release` are O(1) pushes and
//! pops of a singly-linked free list threaded through the vacant slots.
//! This is the pooled-storage discipline the histogram's buckets and
//! groups both rely on, generalized from pointer linkage into one based
//! on `u32` indices so that records can live in a flat `Vec` instead of
//! individually boxed allocations.

enum Slot<T> {
    Vacant { next_free: Option<u32> },
    Occupied(T),
}

pub(crate) struct Pool<T> {
    slots: Vec<Slot<T>>,
    free_head: Option<u32>,
    in_use: usize,
}

impl<T> Pool<T> {
    /// Reserves storage for exactly `capacity` records, all initially free.
    ///
    /// Returns `None` if the reservation fails, in which case no partial
    /// state is left behind.
    pub(crate) fn try_with_capacity(capacity: usize) -> Option<Self> {
        let mut slots = Vec::new();
        slots.try_reserve_exact(capacity).ok()?;
        for i in 0..capacity {
            let next_free = if i + 1 < capacity {
                Some((i + 1) as u32)
            } else {
                None
            };
            slots.push(Slot::Vacant { next_free });
        }
        Some(Self {
            slots,
            free_head: if capacity == 0 { None } else { Some(0) },
            in_use: 0,
        })
    }

    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn in_use(&self) -> usize {
        self.in_use
    }

    /// Acquires a free slot and stores `value` in it, returning its index.
    ///
    /// # Panics
    ///
    /// Panics if the pool is exhausted. Callers size pools from the DGIM
    /// capacity bounds (`(k+1)*m` buckets, `m` groups), which guarantee
    /// this never happens; reaching it is a bug in the sizing or the
    /// maintenance logic, not a condition a caller can recover from.
    pub(crate) fn acquire(&mut self, value: T) -> u32 {
        let idx = match self.free_head {
            Some(idx) => idx,
            None => {
                log::error!(
                    "rustcommon-dgim: pool exhausted (capacity {})",
                    self.slots.len()
                );
                panic!(
                    "rustcommon-dgim: pool exhausted (capacity {})",
                    self.slots.len()
                );
            }
        };
        let next_free = match &self.slots[idx as usize] {
            Slot::Vacant { next_free } => *next_free,
            Slot::Occupied(_) => unreachable!("free list pointed at an occupied slot"),
        };
        self.slots[idx as usize] = Slot::Occupied(value);
        self.free_head = next_free;
        self.in_use += 1;
        idx
    }

    /// Releases the record at `idx` back to the free list, returning it.
    pub(crate) fn release(&mut self, idx: u32) -> T {
        let vacated = Slot::Vacant {
            next_free: self.free_head,
        };
        let value = match std::mem::replace(&mut self.slots[idx as usize], vacated) {
            Slot::Occupied(value) => value,
            Slot::Vacant { .. } => unreachable!("double release of a pool slot"),
        };
        self.free_head = Some(idx);
        self.in_use -= 1;
        value
    }

    pub(crate) fn get(&self, idx: u32) -> &T {
        match &self.slots[idx as usize] {
            Slot::Occupied(value) => value,
            Slot::Vacant { .. } => unreachable!("index does not refer to a live record"),
        }
    }

    pub(crate) fn get_mut(&mut self, idx: u32) -> &mut T {
        match &mut self.slots[idx as usize] {
            Slot::Occupied(value) => value,
            Slot::Vacant { .. } => unreachable!("index does not refer to a live record"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_release_reuses_slots() {
        let mut pool = Pool::<u32>::try_with_capacity(2).unwrap();
        assert_eq!(pool.capacity(), 2);
        assert_eq!(pool.in_use(), 0);

        let a = pool.acquire(10);
        let b = pool.acquire(20);
        assert_eq!(pool.in_use(), 2);
        assert_eq!(*pool.get(a), 10);
        assert_eq!(*pool.get(b), 20);

        assert_eq!(pool.release(a), 10);
        assert_eq!(pool.in_use(), 1);

        let c = pool.acquire(30);
        assert_eq!(c, a, "released slot should be reused before growing");
        assert_eq!(*pool.get(c), 30);
    }

    #[test]
    #[should_panic(expected = "pool exhausted")]
    fn acquire_past_capacity_panics() {
        let mut pool = Pool::<u8>::try_with_capacity(1).unwrap();
        pool.acquire(1);
        pool.acquire(2);
    }

    #[test]
    fn zero_capacity_pool_has_no_free_slots() {
        let pool = Pool::<u8>::try_with_capacity(0).unwrap();
        assert_eq!(pool.capacity(), 0);
    }
}
