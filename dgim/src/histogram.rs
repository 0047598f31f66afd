// Copyright 2023 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! The pooled bucket/group sequences and the maintenance operations that
//! keep them within the DGIM bounds.
//!
//! Buckets form one global sequence, sorted by `last_seen` ascending from
//! `bucket_head` (oldest) to `bucket_tail` (newest). Groups are
//! non-owning windows over contiguous spans of that sequence: a group's
//! `bucket_head`/`bucket_tail` point at the first and last bucket in its
//! span, but buckets are never linked per-group. Promoting a bucket from
//! one group to its (one-larger) neighbor during a merge cascade is
//! therefore a pure boundary reassignment between the two groups; the
//! bucket-level `prev`/`next` links are touched only once, when the freed
//! bucket is physically unlinked.

use crate::bucket::{Bucket, BucketPool};
use crate::group::{Group, GroupPool};

pub(crate) struct Histogram {
    pub(crate) bucket_pool: BucketPool,
    pub(crate) group_pool: GroupPool,
    pub(crate) bucket_head: Option<u32>,
    pub(crate) bucket_tail: Option<u32>,
    pub(crate) group_head: Option<u32>,
    pub(crate) group_tail: Option<u32>,
    pub(crate) group_count: u32,
    pub(crate) wnd_size: u32,
    pub(crate) k: u32,
    pub(crate) now: u32,
    pub(crate) merges: u64,
}

/// `m = 1 + ceil(log2((N-1)/k + 1))`, the maximum number of distinct size
/// classes DGIM can have live at once for a window of `wnd_size` and
/// accuracy parameter `k`.
pub(crate) fn max_groups(wnd_size: u32, k: u32) -> u32 {
    let ratio = (wnd_size as f64 - 1.0) / k as f64 + 1.0;
    (1.0 + ratio.log2().ceil()) as u32
}

impl Histogram {
    pub(crate) fn try_new(wnd_size: u32, k: u32) -> Option<Self> {
        let m = max_groups(wnd_size, k);
        let bucket_capacity = (k as usize + 1) * m as usize;
        let group_capacity = m as usize;
        let bucket_pool = BucketPool::try_with_capacity(bucket_capacity)?;
        let group_pool = GroupPool::try_with_capacity(group_capacity)?;
        Some(Self {
            bucket_pool,
            group_pool,
            bucket_head: None,
            bucket_tail: None,
            group_head: None,
            group_tail: None,
            group_count: 0,
            wnd_size,
            k,
            now: 0,
            merges: 0,
        })
    }

    pub(crate) fn max_groups(&self) -> u32 {
        max_groups(self.wnd_size, self.k)
    }

    pub(crate) fn allocated_bytes(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.bucket_pool.capacity() * std::mem::size_of::<Bucket>()
            + self.group_pool.capacity() * std::mem::size_of::<Group>()
    }

    /// Retires the oldest bucket if it has aged out of the window (§4.3).
    ///
    /// At most one bucket can expire per call: `now` advances by exactly
    /// one tick and timestamps are strictly increasing, so a single check
    /// at the head suffices.
    pub(crate) fn expire(&mut self) {
        let head_idx = match self.bucket_head {
            Some(idx) => idx,
            None => return,
        };
        let last_seen = self.bucket_pool.get(head_idx).last_seen;
        if self.now - last_seen < self.wnd_size {
            return;
        }

        let next = self.bucket_pool.get(head_idx).next;
        self.bucket_pool.release(head_idx);
        self.bucket_head = next;
        match next {
            Some(next_idx) => self.bucket_pool.get_mut(next_idx).prev = None,
            None => self.bucket_tail = None,
        }

        let group_idx = self
            .group_head
            .expect("a live bucket always belongs to the head group");
        let group_emptied = {
            let group = self.group_pool.get_mut(group_idx);
            group.count -= 1;
            if group.count > 0 {
                group.bucket_head =
                    next.expect("group.count > 0 implies a bucket remains in its span");
            }
            group.count == 0
        };

        if group_emptied {
            let successor = self.group_pool.get(group_idx).next;
            self.group_pool.release(group_idx);
            self.group_head = successor;
            match successor {
                Some(idx) => self.group_pool.get_mut(idx).prev = None,
                None => self.group_tail = None,
            }
            self.group_count -= 1;
        }
    }

    /// Appends a bucket for an incoming 1-bit and cascades merges (§4.2).
    pub(crate) fn insert_one(&mut self) {
        let bucket_idx = self.bucket_pool.acquire(Bucket {
            last_seen: self.now,
            prev: self.bucket_tail,
            next: None,
        });
        match self.bucket_tail {
            Some(tail_idx) => self.bucket_pool.get_mut(tail_idx).next = Some(bucket_idx),
            None => self.bucket_head = Some(bucket_idx),
        }
        self.bucket_tail = Some(bucket_idx);

        match self.group_tail {
            Some(tail_group_idx) => {
                let group = self.group_pool.get_mut(tail_group_idx);
                group.count += 1;
                group.bucket_tail = bucket_idx;
            }
            None => {
                let new_group_idx = self.group_pool.acquire(Group {
                    count: 1,
                    bucket_head: bucket_idx,
                    bucket_tail: bucket_idx,
                    prev: None,
                    next: None,
                });
                self.group_head = Some(new_group_idx);
                self.group_tail = Some(new_group_idx);
                self.group_count = 1;
            }
        }

        self.cascade();
    }

    fn cascade(&mut self) {
        let mut g = match self.group_tail {
            Some(idx) => idx,
            None => return,
        };
        let limit = self.k + 1;

        loop {
            if self.group_pool.get(g).count <= limit {
                break;
            }

            let oldest = self.group_pool.get(g).bucket_head;
            let merged = self
                .bucket_pool
                .get(oldest)
                .next
                .expect("a group exceeding its capacity has at least two buckets");
            let oldest_prev = self.bucket_pool.get(oldest).prev;

            self.bucket_pool.release(oldest);
            self.bucket_pool.get_mut(merged).prev = oldest_prev;
            match oldest_prev {
                Some(prev_idx) => self.bucket_pool.get_mut(prev_idx).next = Some(merged),
                None => self.bucket_head = Some(merged),
            }
            self.merges += 1;

            let remaining_head = self
                .bucket_pool
                .get(merged)
                .next
                .expect("a group's count stays at least 1 after a cascade merge");

            let g_mut = self.group_pool.get_mut(g);
            g_mut.count -= 2;
            g_mut.bucket_head = remaining_head;
            let prev_group = g_mut.prev;

            match prev_group {
                Some(pg) => {
                    let pg_mut = self.group_pool.get_mut(pg);
                    pg_mut.bucket_tail = merged;
                    pg_mut.count += 1;
                    g = pg;
                }
                None => {
                    let new_group_idx = self.group_pool.acquire(Group {
                        count: 1,
                        bucket_head: merged,
                        bucket_tail: merged,
                        prev: None,
                        next: Some(g),
                    });
                    self.group_pool.get_mut(g).prev = Some(new_group_idx);
                    self.group_head = Some(new_group_idx);
                    self.group_count += 1;
                    break;
                }
            }
        }
    }

    /// Walks the group sequence tail-to-head, checking every universal
    /// invariant from the testable-properties list. Returns `Err` with a
    /// description of the first violation found, rather than panicking,
    /// so tests can report the specific failure.
    #[cfg(test)]
    pub(crate) fn check_invariants(&self) -> Result<(), String> {
        // 1. bucket timestamps strictly increase head to tail.
        let mut bucket_count = 0usize;
        let mut prev_seen: Option<u32> = None;
        let mut cursor = self.bucket_head;
        let mut last = None;
        while let Some(idx) = cursor {
            let bucket = self.bucket_pool.get(idx);
            if let Some(prev_seen) = prev_seen {
                if bucket.last_seen <= prev_seen {
                    return Err(format!(
                        "bucket timestamps not strictly increasing: {} after {}",
                        bucket.last_seen, prev_seen
                    ));
                }
            }
            prev_seen = Some(bucket.last_seen);
            bucket_count += 1;
            last = cursor;
            cursor = bucket.next;
        }
        if last != self.bucket_tail {
            return Err("walking from bucket_head did not reach bucket_tail".into());
        }

        // 2, 3, 4, 6: walk groups tail to head.
        let mut group_count = 0u32;
        let mut cursor = self.group_tail;
        let mut expected_successor_head: Option<u32> = None; // bucket_head of the group we just visited
        let mut last_group = None;
        while let Some(idx) = cursor {
            let group = self.group_pool.get(idx);
            let is_head_group = Some(idx) == self.group_head;
            if !is_head_group && !(1..=self.k + 1).contains(&group.count) {
                return Err(format!(
                    "non-head group count {} outside [1, {}]",
                    group.count,
                    self.k + 1
                ));
            }
            if group.count == 0 {
                return Err("a live group has count 0".into());
            }

            // group span: exactly `count` consecutive buckets, abutting
            // the previously-visited (tail-ward) group with no gap/overlap.
            if let Some(expected) = expected_successor_head {
                let tail_bucket = self.bucket_pool.get(group.bucket_tail);
                if tail_bucket.next != Some(expected) {
                    return Err("group spans are not contiguous".into());
                }
            } else if Some(group.bucket_tail) != self.bucket_tail {
                return Err("tail group does not reach the bucket sequence tail".into());
            }

            let mut span = 0u32;
            let mut b = Some(group.bucket_head);
            while let Some(bidx) = b {
                span += 1;
                if bidx == group.bucket_tail {
                    break;
                }
                b = self.bucket_pool.get(bidx).next;
            }
            if span != group.count {
                return Err(format!(
                    "group span {} does not match recorded count {}",
                    span, group.count
                ));
            }

            expected_successor_head = Some(group.bucket_head);
            group_count += 1;
            last_group = cursor;
            cursor = group.prev;
        }
        if last_group != self.group_head {
            return Err("walking from group_tail did not reach group_head".into());
        }
        if group_count != self.group_count {
            return Err(format!(
                "group_count field {} does not match {} linked groups",
                self.group_count, group_count
            ));
        }
        if let Some(head_idx) = self.group_head {
            if Some(self.group_pool.get(head_idx).bucket_head) != self.bucket_head {
                return Err("head group does not start at the bucket sequence head".into());
            }
        } else if self.bucket_head.is_some() {
            return Err("buckets exist with no owning group".into());
        }

        let m = self.max_groups();
        if self.group_count > m {
            return Err(format!("group_count {} exceeds m={}", self.group_count, m));
        }

        // 5, 7: pool occupancy bounds.
        if bucket_count as u32 > (self.k + 1) * m {
            return Err(format!(
                "bucket count {} exceeds capacity bound {}",
                bucket_count,
                (self.k + 1) * m
            ));
        }
        if self.bucket_pool.in_use() != bucket_count {
            return Err("bucket pool occupancy disagrees with the live sequence length".into());
        }
        if self.group_pool.in_use() as u32 != group_count {
            return Err("group pool occupancy disagrees with the live sequence length".into());
        }

        Ok(())
    }
}
