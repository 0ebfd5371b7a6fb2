/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that wrap a [`KVStore`](super::pluggables::KVStore) to read and write Block Tree variables.
//!
//! - [`internal::BlockTreeSingleton`]: read-and-write handle owned by the algorithm thread.
//! - [`public::BlockTreeCamera`] and [`public::BlockTreeSnapshot`]: read-only handles for everyone else.

pub mod internal;

pub mod public;
