//! Per-chunk bloom filters.
//!
//! A filter is a list of fixed-width bit arrays. Every address sets five bits in the
//! newest array; the `k`-th bit is the big-endian `u32` read from address bytes
//! `4k..4k+4`, modulo the array width. Once an array holds
//! [`MAX_INSERTS_PER_ARRAY`] addresses a fresh one is started, which keeps the false
//! positive rate flat for large chunks. Lookups never give false negatives.
//!
//! File layout, little-endian: magic `u32`, array count `u32`, then per array the
//! insert count `u32` followed by the bit array.

use std::path::Path;

use crate::{
    errors::{IndexError, Result},
    types::Address,
};

pub const BLOOM_MAGIC: u32 = 0x0b10_0f11;
pub const BLOOM_WIDTH_BITS: usize = 1_048_576;
pub const BLOOM_WIDTH_BYTES: usize = BLOOM_WIDTH_BITS / 8;
pub const MAX_INSERTS_PER_ARRAY: u32 = 50_000;
pub const BITS_PER_ADDRESS: usize = 5;

#[derive(Clone, PartialEq, Eq)]
struct BloomArray {
    inserted: u32,
    bits: Vec<u8>,
}

impl BloomArray {
    fn new() -> Self {
        Self {
            inserted: 0,
            bits: vec![0; BLOOM_WIDTH_BYTES],
        }
    }

    fn set(&mut self, bit: usize) {
        self.bits[bit / 8] |= 1 << (bit % 8);
    }

    fn is_set(&self, bit: usize) -> bool {
        self.bits[bit / 8] & (1 << (bit % 8)) != 0
    }
}

#[derive(Clone, Default, PartialEq, Eq)]
pub struct BloomFilter {
    arrays: Vec<BloomArray>,
}

impl std::fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BloomFilter")
            .field("arrays", &self.arrays.len())
            .field("inserted", &self.len())
            .finish()
    }
}

/// The five bit positions of an address
#[must_use]
pub fn bit_positions(address: &[u8; 20]) -> [usize; BITS_PER_ADDRESS] {
    let mut bits = [0; BITS_PER_ADDRESS];
    for (k, bit) in bits.iter_mut().enumerate() {
        let word = u32::from_be_bytes([
            address[4 * k],
            address[4 * k + 1],
            address[4 * k + 2],
            address[4 * k + 3],
        ]);
        *bit = word as usize % BLOOM_WIDTH_BITS;
    }
    bits
}

impl BloomFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a filter over `addresses`
    pub fn from_addresses<'a>(addresses: impl IntoIterator<Item = &'a Address>) -> Result<Self> {
        let mut filter = Self::new();
        for address in addresses {
            filter.insert(address)?;
        }
        Ok(filter)
    }

    pub fn insert(&mut self, address: &Address) -> Result<()> {
        self.insert_bytes(&address.to_bytes()?);
        Ok(())
    }

    pub fn insert_bytes(&mut self, address: &[u8; 20]) {
        let needs_array = self
            .arrays
            .last()
            .map_or(true, |array| array.inserted >= MAX_INSERTS_PER_ARRAY);
        if needs_array {
            self.arrays.push(BloomArray::new());
        }
        if let Some(array) = self.arrays.last_mut() {
            for bit in bit_positions(address) {
                array.set(bit);
            }
            array.inserted += 1;
        }
    }

    /// Whether `address` may have been inserted. `false` is definitive.
    #[must_use]
    pub fn may_contain(&self, address: &Address) -> bool {
        address
            .to_bytes()
            .is_ok_and(|bytes| self.may_contain_bytes(&bytes))
    }

    #[must_use]
    pub fn may_contain_bytes(&self, address: &[u8; 20]) -> bool {
        let bits = bit_positions(address);
        self.arrays
            .iter()
            .any(|array| bits.iter().all(|&bit| array.is_set(bit)))
    }

    /// Total number of inserted addresses
    #[must_use]
    pub fn len(&self) -> usize {
        self.arrays.iter().map(|a| a.inserted as usize).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn array_count(&self) -> usize {
        self.arrays.len()
    }

    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.arrays.len() * (4 + BLOOM_WIDTH_BYTES));
        out.extend_from_slice(&BLOOM_MAGIC.to_le_bytes());
        out.extend_from_slice(&(self.arrays.len() as u32).to_le_bytes());
        for array in &self.arrays {
            out.extend_from_slice(&array.inserted.to_le_bytes());
            out.extend_from_slice(&array.bits);
        }
        out
    }

    pub fn from_bytes(path: &Path, bytes: &[u8]) -> Result<Self> {
        let corrupt = |reason: &str| IndexError::corrupt_file(path, reason);

        let magic = read_u32(bytes, 0).ok_or_else(|| corrupt("truncated header"))?;
        if magic != BLOOM_MAGIC {
            return Err(corrupt("bad magic number"));
        }
        let count = read_u32(bytes, 4).ok_or_else(|| corrupt("truncated header"))? as usize;
        let expected = 8 + count * (4 + BLOOM_WIDTH_BYTES);
        if bytes.len() != expected {
            return Err(corrupt(&format!(
                "expected {expected} bytes for {count} arrays, found {}",
                bytes.len()
            )));
        }

        let arrays = (0..count)
            .map(|i| {
                let start = 8 + i * (4 + BLOOM_WIDTH_BYTES);
                BloomArray {
                    inserted: read_u32(bytes, start).unwrap_or(0),
                    bits: bytes[start + 4..start + 4 + BLOOM_WIDTH_BYTES].to_vec(),
                }
            })
            .collect();
        Ok(Self { arrays })
    }

    pub async fn write(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("bloom.tmp");
        tokio::fs::write(&tmp, self.to_bytes())
            .await
            .map_err(|e| IndexError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| IndexError::io(path, e))
    }

    pub async fn read(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| IndexError::io(path, e))?;
        Self::from_bytes(path, &bytes)
    }
}

pub(crate) fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    let slice = bytes.get(at..at + 4)?;
    Some(u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
}
