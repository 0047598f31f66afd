// Copyright 2023 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! The group record and its arena alias.

use crate::pool::Pool;

/// A maximal contiguous run of same-size-class buckets. `bucket_head` and
/// `bucket_tail` are indices into the shared bucket sequence delimiting
/// this group's span; they do not own a separate link chain.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Group {
    pub(crate) count: u32,
    pub(crate) bucket_head: u32,
    pub(crate) bucket_tail: u32,
    pub(crate) prev: Option<u32>,
    pub(crate) next: Option<u32>,
}

pub(crate) type GroupPool = Pool<Group>;
