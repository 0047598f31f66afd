// Copyright 2023 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! The bucket record and its arena alias.

use crate::pool::Pool;

/// Tags the newest stream position covered by a power-of-two-sized run of
/// 1s. Buckets form a single sequence sorted by `last_seen` ascending,
/// shared across the whole histogram; groups are windows over it, not
/// separate lists (see `histogram` module docs).
#[derive(Debug, Clone, Copy)]
pub(crate) struct Bucket {
    pub(crate) last_seen: u32,
    pub(crate) prev: Option<u32>,
    pub(crate) next: Option<u32>,
}

pub(crate) type BucketPool = Pool<Bucket>;
