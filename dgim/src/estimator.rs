// Copyright 2023 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Tick orchestration (§2) and the count estimate (§4.4).

use crate::histogram::Histogram;

/// Advances the logical clock by one position, expires the bucket that
/// fell out of the window (if any), records a new bucket when `bit` is
/// set, and returns the refreshed estimate.
pub(crate) fn tick(histogram: &mut Histogram, bit: bool) -> u64 {
    histogram.now += 1;
    histogram.expire();
    if bit {
        histogram.insert_one();
    }
    estimate(histogram)
}

/// `1 + 2^(G-1) * (g[G-1].count - 1) + sum_{i=0}^{G-2} 2^i * g[i].count`,
/// walking groups from the tail (newest, smallest weight) to the head
/// (oldest, largest weight, and half-discounted since its oldest bucket
/// may not be fully covered by the window).
pub(crate) fn estimate(histogram: &Histogram) -> u64 {
    let mut cursor = histogram.group_tail;
    if cursor.is_none() {
        return 0;
    }

    let mut weight: u64 = 1;
    let mut total: u64 = 0;
    while let Some(idx) = cursor {
        let group = histogram.group_pool.get(idx);
        let is_head_group = Some(idx) == histogram.group_head;
        if is_head_group {
            total += 1 + weight * (group.count as u64 - 1);
        } else {
            total += weight * group.count as u64;
        }
        weight *= 2;
        cursor = group.prev;
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_histogram_estimates_zero() {
        let h = Histogram::try_new(5, 1).unwrap();
        assert_eq!(estimate(&h), 0);
    }

    #[test]
    fn single_bucket_estimates_one() {
        let mut h = Histogram::try_new(5, 1).unwrap();
        assert_eq!(tick(&mut h, true), 1);
    }

    #[test]
    fn two_buckets_of_size_one_estimate_two() {
        let mut h = Histogram::try_new(5, 1).unwrap();
        tick(&mut h, true);
        assert_eq!(tick(&mut h, true), 2);
    }
}
