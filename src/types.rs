use crate::errors::{IndexError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

/// Width of a zero-padded block number in file names and appearance lines
pub const BLOCK_NUMBER_WIDTH: usize = 9;

/// Width of a zero-padded transaction index in appearance lines
pub const TX_INDEX_WIDTH: usize = 5;

/// A blockchain block number with validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockNumber(u64);

impl BlockNumber {
    /// Largest block number that still fits the 9-digit padded file names
    pub const MAX: u64 = 999_999_999;

    /// Creates a new `BlockNumber` with validation
    pub fn new(value: u64) -> Result<Self> {
        if value > Self::MAX {
            return Err(IndexError::invalid_format(
                "block_number",
                &format!("Block number too large: {value}"),
            ));
        }
        Ok(Self(value))
    }

    /// Creates a `BlockNumber` without validation (for trusted sources)
    #[must_use]
    pub const fn from_trusted(value: u64) -> Self {
        Self(value)
    }

    /// Gets the inner value
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Creates a `BlockNumber` from a hex string
    pub fn from_hex(hex: &str) -> Result<Self> {
        let cleaned = hex.strip_prefix("0x").unwrap_or(hex);
        let value = u64::from_str_radix(cleaned, 16).map_err(|e| {
            IndexError::invalid_format(
                "block_number",
                &format!("Invalid hex block number '{hex}': {e}"),
            )
        })?;
        Self::new(value)
    }

    /// Hex quantity as expected by JSON-RPC params
    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("0x{:x}", self.0)
    }

    /// Zero-padded form used in file names and appearance lines
    #[must_use]
    pub fn to_padded(&self) -> String {
        format!("{:0width$}", self.0, width = BLOCK_NUMBER_WIDTH)
    }
}

impl fmt::Display for BlockNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<BlockNumber> for u64 {
    fn from(block_number: BlockNumber) -> Self {
        block_number.0
    }
}

impl FromStr for BlockNumber {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self> {
        let value = s.parse::<u64>().map_err(|e| {
            IndexError::invalid_format("block_number", &format!("Invalid block number '{s}': {e}"))
        })?;
        Self::new(value)
    }
}

impl Add<u64> for BlockNumber {
    type Output = Self;

    fn add(self, other: u64) -> Self {
        Self::from_trusted(self.0.saturating_add(other))
    }
}

impl Sub<u64> for BlockNumber {
    type Output = Self;

    fn sub(self, other: u64) -> Self {
        Self::from_trusted(self.0.saturating_sub(other))
    }
}

/// An Ethereum address, normalized to lowercase `0x`-prefixed hex
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    /// Address recorded in place of a zero-address reward recipient
    pub const BURN: &'static str = "0xdeaddeaddeaddeaddeaddeaddeaddeaddeaddead";

    /// Creates a new Address with validation
    pub fn new(value: &str) -> Result<Self> {
        Self::validate_address(value)?;
        Ok(Self(value.to_ascii_lowercase()))
    }

    /// Creates an Address without validation (for trusted sources)
    #[must_use]
    pub const fn from_trusted(value: String) -> Self {
        Self(value)
    }

    /// The burn sentinel address
    #[must_use]
    pub fn burn() -> Self {
        Self(Self::BURN.to_string())
    }

    /// Builds an address from the low 20 bytes of a 32-byte hex word
    pub fn from_word(word: &str) -> Result<Self> {
        if word.len() != 64 {
            return Err(IndexError::invalid_format(
                "word",
                &format!("Word must be 64 hex characters (got {})", word.len()),
            ));
        }
        Self::new(&format!("0x{}", &word[24..]))
    }

    /// Gets the inner value
    #[must_use]
    pub fn value(&self) -> &str {
        &self.0
    }

    /// Whether every byte of the address is zero
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0[2..].bytes().all(|b| b == b'0')
    }

    /// Raw 20-byte form
    pub fn to_bytes(&self) -> Result<[u8; 20]> {
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(&self.0[2..], &mut bytes)
            .map_err(|e| IndexError::invalid_format("address", &format!("{}: {e}", self.0)))?;
        Ok(bytes)
    }

    /// Builds an address from its raw 20-byte form
    #[must_use]
    pub fn from_bytes(bytes: &[u8; 20]) -> Self {
        Self(format!("0x{}", hex::encode(bytes)))
    }

    fn validate_address(value: &str) -> Result<()> {
        let Some(cleaned) = value.strip_prefix("0x") else {
            return Err(IndexError::invalid_format(
                "address",
                &format!("Address must start with '0x': {value}"),
            ));
        };

        if cleaned.len() != 40 {
            return Err(IndexError::invalid_format(
                "address",
                &format!(
                    "Address must be 40 hex characters (got {}): {}",
                    cleaned.len(),
                    value
                ),
            ));
        }

        if !cleaned.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(IndexError::invalid_format(
                "address",
                &format!("Address contains non-hex characters: {value}"),
            ));
        }

        Ok(())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl FromStr for Address {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// A transaction hash with hex validation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionHash(String);

impl TransactionHash {
    /// Creates a new `TransactionHash` with validation
    pub fn new(value: String) -> Result<Self> {
        let cleaned = value.strip_prefix("0x").unwrap_or(&value);

        if cleaned.len() != 64 {
            return Err(IndexError::invalid_format(
                "transaction_hash",
                &format!(
                    "Hash must be 64 hex characters (got {}): {}",
                    cleaned.len(),
                    value
                ),
            ));
        }

        if !cleaned.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(IndexError::invalid_format(
                "transaction_hash",
                &format!("Hash contains non-hex characters: {value}"),
            ));
        }

        Ok(Self(value))
    }

    /// Gets the inner value
    #[must_use]
    pub fn value(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of an appearance inside its block.
///
/// Real transaction indices are below [`TxIndex::FIRST_SENTINEL`]; the values from
/// there up to 99999 anchor appearances that have no transaction, such as rewards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxIndex(u32);

impl TxIndex {
    pub const FIRST_SENTINEL: u32 = 99_996;
    pub const EXTERNAL_REWARD: Self = Self(99_996);
    pub const UNCLE_REWARD: Self = Self(99_998);
    pub const BLOCK_REWARD: Self = Self(99_999);

    /// A real transaction position
    pub fn transaction(position: u64) -> Result<Self> {
        match u32::try_from(position) {
            Ok(value) if value < Self::FIRST_SENTINEL => Ok(Self(value)),
            _ => Err(IndexError::invalid_format(
                "transaction_index",
                &format!("Transaction index {position} collides with the sentinel range"),
            )),
        }
    }

    /// Parses a hex quantity such as `0x1a`
    pub fn from_hex(hex: &str) -> Result<Self> {
        let cleaned = hex.strip_prefix("0x").unwrap_or(hex);
        let value = u64::from_str_radix(cleaned, 16).map_err(|e| {
            IndexError::invalid_format(
                "transaction_index",
                &format!("Invalid hex transaction index '{hex}': {e}"),
            )
        })?;
        Self::transaction(value)
    }

    #[must_use]
    pub const fn value(&self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn is_sentinel(&self) -> bool {
        self.0 >= Self::FIRST_SENTINEL
    }

    pub(crate) const fn from_raw(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Display for TxIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:0width$}", self.0, width = TX_INDEX_WIDTH)
    }
}

impl FromStr for TxIndex {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self> {
        let value = s.parse::<u32>().map_err(|e| {
            IndexError::invalid_format("transaction_index", &format!("'{s}': {e}"))
        })?;
        if value > 99_999 {
            return Err(IndexError::invalid_format(
                "transaction_index",
                &format!("Transaction index out of range: {value}"),
            ));
        }
        Ok(Self(value))
    }
}

/// One address appearing at one block/transaction position.
///
/// Field order gives the derived ordering `(address, block, index)`, which matches
/// the lexicographic order of the rendered line.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AppearanceRecord {
    pub address: Address,
    pub block_number: BlockNumber,
    pub tx_index: TxIndex,
}

impl AppearanceRecord {
    #[must_use]
    pub const fn new(address: Address, block_number: BlockNumber, tx_index: TxIndex) -> Self {
        Self {
            address,
            block_number,
            tx_index,
        }
    }
}

impl fmt::Display for AppearanceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}",
            self.address,
            self.block_number.to_padded(),
            self.tx_index
        )
    }
}

impl FromStr for AppearanceRecord {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split('\t');
        let (Some(address), Some(block), Some(index), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(IndexError::invalid_format(
                "appearance",
                &format!("Expected three tab-separated fields: '{s}'"),
            ));
        };

        Ok(Self {
            address: address.parse()?,
            block_number: block.parse()?,
            tx_index: index.parse()?,
        })
    }
}

/// Reorg-safety class of a scraped block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    Ripe,
    Unripe,
}

impl Partition {
    /// Directory name of the partition inside the index folder
    #[must_use]
    pub const fn dir_name(&self) -> &'static str {
        match self {
            Self::Ripe => "ripe",
            Self::Unripe => "unripe",
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// An inclusive block range
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockRange {
    pub first: BlockNumber,
    pub last: BlockNumber,
}

impl BlockRange {
    pub fn new(first: BlockNumber, last: BlockNumber) -> Result<Self> {
        if first > last {
            return Err(IndexError::invalid_range(first.value(), last.value()));
        }
        Ok(Self { first, last })
    }

    /// A range covering a single block
    #[must_use]
    pub const fn single(block: BlockNumber) -> Self {
        Self {
            first: block,
            last: block,
        }
    }

    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.first <= other.last && other.first <= self.last
    }

    #[must_use]
    pub fn contains(&self, block: BlockNumber) -> bool {
        self.first <= block && block <= self.last
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.first.to_padded(), self.last.to_padded())
    }
}

impl FromStr for BlockRange {
    type Err = IndexError;

    /// Accepts `first-last` as well as a single block number
    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('-') {
            Some((first, last)) => Self::new(first.parse()?, last.parse()?),
            None => Ok(Self::single(s.parse()?)),
        }
    }
}

/// Wall-clock time of a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    pub block_number: BlockNumber,
    pub unix_seconds: u64,
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{:0width$}",
            self.block_number.to_padded(),
            self.unix_seconds,
            width = BLOCK_NUMBER_WIDTH
        )
    }
}

impl FromStr for Timestamp {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self> {
        let (block, seconds) = s.split_once('-').ok_or_else(|| {
            IndexError::invalid_format("timestamp", &format!("Expected 'block-seconds': '{s}'"))
        })?;
        Ok(Self {
            block_number: block.parse()?,
            unix_seconds: seconds.parse().map_err(|e| {
                IndexError::invalid_format("timestamp", &format!("'{seconds}': {e}"))
            })?,
        })
    }
}
