// Copyright 2023 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Approximate count of set bits in a sliding window over a bit stream,
//! using the DGIM (Datar-Gionis-Indyk-Motwani) exponential histogram.
//!
//! The stream is consumed one bit at a time through [`DgimCounter::next`].
//! Memory is bounded: a window of `wnd_size` bits tracked with accuracy
//! parameter `k` never holds more than `O(k log(wnd_size/k))` buckets,
//! fixed at construction time and never reallocated afterward.

mod bucket;
mod error;
mod estimator;
mod group;
mod histogram;
mod pool;

pub use error::Error;

use histogram::Histogram;
use std::io::{self, Write};

/// A sliding-window approximate count of set bits, backed by a DGIM
/// exponential histogram.
pub struct DgimCounter {
    histogram: Histogram,
}

impl DgimCounter {
    /// Builds a counter for a window of `wnd_size` bits with accuracy
    /// parameter `k` (estimate within a factor of `1/k` of the true
    /// count). Both must be at least 1.
    ///
    /// Returns `Err(Error::AllocationFailed)` instead of aborting if the
    /// backing pools cannot be reserved.
    pub fn try_new(wnd_size: u32, k: u32) -> Result<Self, Error> {
        assert!(wnd_size >= 1, "window size must be at least 1");
        assert!(k >= 1, "accuracy parameter k must be at least 1");
        Histogram::try_new(wnd_size, k)
            .map(|histogram| Self { histogram })
            .ok_or(Error::AllocationFailed)
    }

    /// Like [`DgimCounter::try_new`], panicking instead of returning an
    /// error if the backing pools cannot be allocated.
    pub fn new(wnd_size: u32, k: u32) -> Self {
        Self::try_new(wnd_size, k).expect("failed to allocate rustcommon-dgim pool storage")
    }

    /// Feeds one more bit from the stream and returns the refreshed
    /// estimate of the number of 1s in the trailing window.
    pub fn next(&mut self, bit: bool) -> u64 {
        let estimate = estimator::tick(&mut self.histogram, bit);
        log::trace!(
            "rustcommon-dgim: tick now={} bit={} estimate={}",
            self.histogram.now,
            bit,
            estimate
        );
        estimate
    }

    /// Total bytes held by the counter's pools, fixed at construction.
    pub fn allocated_bytes(&self) -> usize {
        self.histogram.allocated_bytes()
    }

    /// Writes a human-readable diagnostic dump: configuration, pool
    /// occupancy, and the sequence boundaries, per §4.5/§6.4.
    pub fn print_diagnostics<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let h = &self.histogram;
        writeln!(out, "rustcommon-dgim diagnostics")?;
        writeln!(out, "  k              = {}", h.k)?;
        writeln!(out, "  wnd_size (N)   = {}", h.wnd_size)?;
        writeln!(out, "  max_groups (m) = {}", h.max_groups())?;
        writeln!(out, "  now            = {}", h.now)?;
        writeln!(
            out,
            "  buckets        = {}/{} in use",
            h.bucket_pool.in_use(),
            h.bucket_pool.capacity()
        )?;
        writeln!(
            out,
            "  groups         = {}/{} in use",
            h.group_pool.in_use(),
            h.group_pool.capacity()
        )?;
        writeln!(out, "  bucket_head    = {:?}", h.bucket_head)?;
        writeln!(out, "  bucket_tail    = {:?}", h.bucket_tail)?;
        writeln!(out, "  group_head     = {:?}", h.group_head)?;
        writeln!(out, "  group_tail     = {:?}", h.group_tail)?;
        writeln!(out, "  merges         = {}", h.merges)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_degenerate_window_and_accuracy() {
        let result = std::panic::catch_unwind(|| DgimCounter::new(0, 1));
        assert!(result.is_err());
        let result = std::panic::catch_unwind(|| DgimCounter::new(1, 0));
        assert!(result.is_err());
    }

    #[test]
    fn matches_true_count_for_a_stream_shorter_than_the_window() {
        let mut counter = DgimCounter::new(100, 2);
        let mut last = 0;
        for bit in [true, true, false, true, false] {
            last = counter.next(bit);
        }
        assert_eq!(last, 3);
    }

    #[test]
    fn allocated_bytes_is_stable_across_ticks() {
        let mut counter = DgimCounter::new(50, 2);
        let before = counter.allocated_bytes();
        for _ in 0..50 {
            counter.next(true);
        }
        assert_eq!(before, counter.allocated_bytes());
    }

    #[test]
    fn print_diagnostics_reports_configuration() {
        let mut counter = DgimCounter::new(10, 3);
        counter.next(true);
        let mut buf = Vec::new();
        counter.print_diagnostics(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("wnd_size (N)   = 10"));
        assert!(text.contains("k              = 3"));
    }

    #[test]
    fn error_bound_holds_over_a_pseudorandom_stream() {
        // Hand-rolled LCG (numerical recipes constants): deterministic,
        // dependency-free pseudo-randomness for a property test.
        struct Lcg(u64);
        impl Lcg {
            fn next_bit(&mut self) -> bool {
                self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1);
                (self.0 >> 63) & 1 == 1
            }
        }

        let (n, k) = (64u32, 4u32);
        let mut counter = DgimCounter::new(n, k);
        let mut lcg = Lcg(0x5EED);
        let mut window = std::collections::VecDeque::with_capacity(n as usize);

        for _ in 0..2000 {
            let bit = lcg.next_bit();
            let estimate = counter.next(bit);

            window.push_back(bit);
            if window.len() > n as usize {
                window.pop_front();
            }
            let true_count = window.iter().filter(|&&b| b).count() as u64;

            assert!(
                estimate.abs_diff(true_count) * k as u64 <= true_count,
                "estimate {estimate} vs true {true_count} exceeded bound T/k for k={k}"
            );
        }
    }
}
