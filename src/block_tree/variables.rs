/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Byte-prefixes that specify where each Block Tree variable is stored in the user-provided key-value
//! store.
//!
//! # List of State Variables
//!
//! ## Blocks
//!
//! |Variable|Type|Description|
//! |---|---|---|
//! |Blocks|[`CryptoHash`](crate::types::data_types::CryptoHash) -> [`Block`](crate::types::block::Block)|Mapping between a block's hash and the block itself. Contains every block ever appended, committed or not. Blocks are never pruned.|
//! |Block at Height|[`BlockHeight`](crate::types::data_types::BlockHeight) -> [`CryptoHash`](crate::types::data_types::CryptoHash)|Mapping between a height and the committed block at that height. Only committed blocks appear here, because before commit there may be several blocks at the same height.|
//! |Block to Children|[`CryptoHash`](crate::types::data_types::CryptoHash) -> [`ChildrenList`](crate::types::data_types::ChildrenList)|Mapping between a block's hash and the blocks whose `parent` it is.|
//!
//! ## Replica State
//!
//! |Variable|Type|Description|
//! |---|---|---|
//! |Current View|[`ViewNumber`](crate::types::data_types::ViewNumber)|The view the replica is currently in.|
//! |Locked QC|[`QuorumCertificate`](crate::hotstuff::types::QuorumCertificate)|The currently locked QC. [Read more](super::invariants).|
//! |Highest QC|[`QuorumCertificate`](crate::hotstuff::types::QuorumCertificate)|Among the QCs this replica has seen and verified, the one with the highest view.|
//! |Last Voted Height|[`BlockHeight`](crate::types::data_types::BlockHeight)|The height of the block the replica last voted for. Strictly increases with every vote.|
//! |Leaf Block|[`CryptoHash`](crate::types::data_types::CryptoHash)|The most recently appended block.|
//! |Highest Committed Block|[`CryptoHash`](crate::types::data_types::CryptoHash)|The committed block with the highest height.|
//!
//! # Persistence of state variables
//!
//! Every variable is stored as a **Borsh-serialized value**.
//!
//! "Single values" (e.g., locked QC) are stored in one-byte, constant keys defined in constants sharing
//! the variable's name.
//!
//! Mappings of the form "`A` -> `B`" (e.g., blocks) are stored in multiple keys, each key being the
//! concatenation of a one-byte prefix sharing the variable's name and the Borsh serialization of an
//! instance of `A`. For example, the block with hash `h` is stored at `concat(&BLOCKS, &h.bytes())`.

// State variables
pub const BLOCKS: [u8; 1] = [0];
pub const BLOCK_AT_HEIGHT: [u8; 1] = [1];
pub const BLOCK_TO_CHILDREN: [u8; 1] = [2];
pub const CURRENT_VIEW: [u8; 1] = [3];
pub const LOCKED_QC: [u8; 1] = [4];
pub const HIGHEST_QC: [u8; 1] = [5];
pub const LAST_VOTED_HEIGHT: [u8; 1] = [6];
pub const LEAF_BLOCK: [u8; 1] = [7];
pub const HIGHEST_COMMITTED_BLOCK: [u8; 1] = [8];

/// Concatenate two byteslices into one vector.
pub fn concat(a: &[u8], b: &[u8]) -> Vec<u8> {
    let mut res = Vec::with_capacity(a.len() + b.len());
    res.extend_from_slice(a);
    res.extend_from_slice(b);
    res
}
