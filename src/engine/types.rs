//! Core identifiers, capacities and signature bitsets.
//!
//! This module defines the **fundamental types** shared by every other part of
//! the store: entity and persistent ids, archetype/component/tag ids, the
//! chunk geometry, and the [`Signature`] bitsets that decide which archetype
//! owns an entity.
//!
//! ## Signatures
//!
//! An archetype is identified by its *exact* component set plus its *exact*
//! tag set. Both halves are fixed-size arrays of `u64` words:
//!
//! ```text
//! Signature { components: [u64; SIGNATURE_SIZE], tags: [u64; SIGNATURE_SIZE] }
//! ```
//!
//! which keeps signature comparison, hashing and superset checks branch-light
//! and allocation-free.
//!
//! ## Chunk geometry
//!
//! Columns are split into blocks of [`CHUNK_CAP`] rows. A linear row index maps
//! to `(row / CHUNK_CAP, row % CHUNK_CAP)`; `CHUNK_CAP` is a power of two so
//! both operations reduce to a shift and a mask.

/// Dense entity identifier, unique within one store. `0` is the null node.
pub type EntityId = u32;
/// External persistent identifier used in exported records.
pub type Pid = i64;
/// Process-unique store identifier embedded in every entity handle.
pub type StoreId = u32;
/// Generation counter bumped every time an entity id is freed.
pub type Generation = u32;

/// Unique identifier for an archetype within one store.
pub type ArchetypeID = u32;

/// Registered component type index (bit position in a signature).
pub type ComponentID = u16;
/// Registered tag type index (bit position in a signature).
pub type TagID = u16;
/// Registered script type index.
pub type ScriptID = u16;

/// Maximum number of rows per chunk. Must stay a power of two.
pub const CHUNK_CAP: usize = 512;
const _: [(); 1] = [(); CHUNK_CAP.is_power_of_two() as usize];

/// Shift turning a linear row into its chunk index.
pub const CHUNK_SHIFT: u32 = CHUNK_CAP.trailing_zeros();
/// Mask turning a linear row into its offset inside a chunk.
pub const CHUNK_MASK: usize = CHUNK_CAP - 1;

/// Maximum number of registered component types.
pub const COMPONENT_CAP: usize = 256;
/// Maximum number of registered tag types.
pub const TAG_CAP: usize = 256;
/// Maximum number of registered script types.
pub const SCRIPT_CAP: usize = 256;
/// Number of `u64` words in each half of a [`Signature`].
pub const SIGNATURE_SIZE: usize = (COMPONENT_CAP + 63) / 64;

const _: [(); 1] = [(); (TAG_CAP <= SIGNATURE_SIZE * 64) as usize];

/// Splits a linear row into `(chunk, offset)` coordinates.
#[inline]
pub const fn chunk_position(row: usize) -> (usize, usize) {
    (row >> CHUNK_SHIFT, row & CHUNK_MASK)
}

/// Fixed-size bitset over small integer ids.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Bits {
    /// Packed bit words.
    pub words: [u64; SIGNATURE_SIZE],
}

impl Bits {
    /// Sets bit `id`.
    #[inline]
    pub fn set(&mut self, id: u16) {
        let (word, bit) = Self::split(id);
        self.words[word] |= 1u64 << bit;
    }

    /// Clears bit `id`.
    #[inline]
    pub fn clear(&mut self, id: u16) {
        let (word, bit) = Self::split(id);
        self.words[word] &= !(1u64 << bit);
    }

    /// Returns `true` if bit `id` is set.
    #[inline]
    pub fn has(&self, id: u16) -> bool {
        let (word, bit) = Self::split(id);
        (self.words[word] >> bit) & 1 == 1
    }

    /// Returns `true` if every bit of `other` is also set in `self`.
    #[inline]
    pub fn contains_all(&self, other: &Bits) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .all(|(a, b)| (a & b) == *b)
    }

    /// Returns `true` if `self` and `other` share at least one bit.
    #[inline]
    pub fn intersects(&self, other: &Bits) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .any(|(a, b)| (a & b) != 0)
    }

    /// Returns `true` if no bit is set.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// Number of set bits.
    #[inline]
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Iterates over set bit positions in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.words
            .iter()
            .enumerate()
            .flat_map(|(word_index, &word)| {
                let base = word_index * 64;
                let mut bits = word;
                std::iter::from_fn(move || {
                    if bits == 0 {
                        return None;
                    }
                    let tz = bits.trailing_zeros() as usize;
                    bits &= bits - 1;
                    Some((base + tz) as u16)
                })
            })
    }

    #[inline]
    fn split(id: u16) -> (usize, usize) {
        ((id as usize) / 64, (id as usize) % 64)
    }
}

/// Exact component-type and tag set owned by one archetype.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Signature {
    /// Component type bits.
    pub components: Bits,
    /// Tag bits.
    pub tags: Bits,
}

impl Signature {
    /// Returns `true` if `self` is a superset of `other` in both halves.
    #[inline]
    pub fn contains_all(&self, other: &Signature) -> bool {
        self.components.contains_all(&other.components) && self.tags.contains_all(&other.tags)
    }

    /// Returns `true` if `self` shares any component or tag with `other`.
    #[inline]
    pub fn intersects(&self, other: &Signature) -> bool {
        self.components.intersects(&other.components) || self.tags.intersects(&other.tags)
    }

    /// Returns `true` for the empty signature (no components, no tags).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty() && self.tags.is_empty()
    }
}

/// Archetype filter used by queries: required set plus excluded set.
#[derive(Clone, Copy, Debug, Default)]
pub struct QuerySignature {
    /// Components and tags an archetype must contain.
    pub all: Signature,
    /// Components and tags an archetype must not contain.
    pub without: Signature,
}

impl QuerySignature {
    /// Returns `true` if an archetype with `archetype_signature` satisfies the filter.
    #[inline]
    pub fn matches(&self, archetype_signature: &Signature) -> bool {
        archetype_signature.contains_all(&self.all) && !archetype_signature.intersects(&self.without)
    }
}
