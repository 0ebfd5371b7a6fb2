/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that exist only to store bytes, and do not have any major "active" behavior.

use std::{
    fmt::{self, Debug, Display, Formatter},
    hash::Hash,
    ops::{Add, AddAssign, Sub, SubAssign},
};

use borsh::{BorshDeserialize, BorshSerialize};

/// Number that uniquely identifies a blockchain.
///
/// Every message exchanged by replicas carries the `ChainID` of the block tree it is about. Replicas
/// drop messages whose `ChainID` differs from the one they were configured with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct ChainID(u64);

impl ChainID {
    /// Create a new `ChainID` with an `int` value.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the `u64` value of this `ChainID`.
    pub const fn int(&self) -> u64 {
        self.0
    }
}

/// View number. Starts at 0 and increases by 1 every time a replica votes or times out.
///
/// In the chained protocol every block occupies the view slot it was proposed in, so a block's height
/// is also a `ViewNumber` (see [`BlockHeight`]).
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct ViewNumber(u64);

impl ViewNumber {
    /// Create a new `ViewNumber` wrapping `int`.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the initial `ViewNumber`, which is 0.
    pub const fn init() -> Self {
        Self(0)
    }

    /// Get the inner `u64` of this `ViewNumber`.
    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl Display for ViewNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Add<u64> for ViewNumber {
    type Output = ViewNumber;

    fn add(self, rhs: u64) -> Self::Output {
        ViewNumber(self.0.saturating_add(rhs))
    }
}

impl AddAssign<u64> for ViewNumber {
    fn add_assign(&mut self, rhs: u64) {
        self.0 = self.0.saturating_add(rhs)
    }
}

impl Sub<u64> for ViewNumber {
    type Output = ViewNumber;

    fn sub(self, rhs: u64) -> Self::Output {
        ViewNumber(self.0.saturating_sub(rhs))
    }
}

/// Height of a block in the block tree.
///
/// Starts at 0 for the genesis block and equals the view the block was proposed in. Gaps left by
/// skipped views are filled with [filler blocks](super::block::Block::fillers), so height also equals
/// the block's depth in the tree.
pub type BlockHeight = ViewNumber;

/// 32-byte cryptographic hash.
///
/// Block hashes are always SHA256 hashes computed by [`Block::hash`](super::block::Block::hash).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize)]
pub struct CryptoHash([u8; 32]);

impl CryptoHash {
    /// Create a new `CryptoHash` wrapping `bytes`.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The all-zeroes hash, used as the hash of the (virtual) genesis block.
    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    /// Get the inner `[u8; 32]` value of this `CryptoHash`.
    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl Display for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for byte in &self.0[0..4] {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl Debug for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

/// Opaque command bytes provided by the [`App`](crate::app::App) and ordered by consensus.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct Command(Vec<u8>);

impl Command {
    /// Create a new `Command` wrapping `bytes`.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// The command carried by filler blocks.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Get a reference to the inner bytes of this `Command`.
    pub fn bytes(&self) -> &Vec<u8> {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// List of children of a particular block.
///
/// The "children" of a `block` is the set of blocks whose `parent` is `block`.
///
/// Instances of this type are stored in the block tree's
/// ["Block to Children"](crate::block_tree::variables) state variable.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize, Default)]
pub struct ChildrenList(Vec<CryptoHash>);

impl ChildrenList {
    /// Create a new `ChildrenList` wrapping around `blocks`.
    pub(crate) fn new(blocks: Vec<CryptoHash>) -> Self {
        Self(blocks)
    }

    /// Get a reference to the inner `Vec<CryptoHash>` value of this `ChildrenList`.
    pub const fn vec(&self) -> &Vec<CryptoHash> {
        &self.0
    }

    /// Iterate through the hashes of the blocks in this `ChildrenList`.
    pub fn iter(&self) -> std::slice::Iter<'_, CryptoHash> {
        self.0.iter()
    }

    /// Add `hash` to this `ChildrenList` if it is not already in it.
    pub(crate) fn push(&mut self, hash: CryptoHash) {
        if !self.0.contains(&hash) {
            self.0.push(hash)
        }
    }
}

/// Bytes of an Ed25519 verifying key. This is how replicas identify each other inside messages.
pub type VerifyingKeyBytes = [u8; 32];

/// One replica's share of a quorum signature over a message.
///
/// The encoding of the bytes is decided by the [`ThresholdScheme`](super::crypto_primitives::ThresholdScheme)
/// that produced it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct SignatureShare(Vec<u8>);

impl SignatureShare {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> &Vec<u8> {
        &self.0
    }
}

/// A signature produced by [combining](super::crypto_primitives::ThresholdScheme::combine) at least a
/// quorum of [`SignatureShare`]s over the same message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct CombinedSignature(Vec<u8>);

impl CombinedSignature {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// The empty signature carried by the genesis quorum certificate.
    pub const fn genesis() -> Self {
        Self(Vec::new())
    }

    pub fn bytes(&self) -> &Vec<u8> {
        &self.0
    }
}

/// Size of a buffer (in bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct BufferSize(u64);

impl BufferSize {
    /// Create a new `BufferSize` wrapping `int`.
    pub fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the inner `u64` value of this `BufferSize`.
    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl AddAssign<u64> for BufferSize {
    fn add_assign(&mut self, rhs: u64) {
        self.0 = self.0.saturating_add(rhs)
    }
}

impl SubAssign<u64> for BufferSize {
    fn sub_assign(&mut self, rhs: u64) {
        self.0.sub_assign(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_arithmetic_saturates() {
        assert_eq!(ViewNumber::new(u64::MAX) + 2, ViewNumber::new(u64::MAX));
        assert_eq!(ViewNumber::new(1) - 2, ViewNumber::init());

        let mut view = ViewNumber::new(u64::MAX - 1);
        view += 5;
        assert_eq!(view, ViewNumber::new(u64::MAX));
    }
}
