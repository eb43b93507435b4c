//! Heuristics deciding which hex text counts as an address.

/// Strategy for recognizing addresses in raw trace and log data
pub trait AddressPolicy: Send + Sync {
    /// Whether a `0x`-prefixed address is worth indexing
    fn is_good_address(&self, address: &str) -> bool;

    /// Whether a 64-character hex word looks like a left-padded address
    fn is_potential_address(&self, word: &str) -> bool;
}

/// Chain-agnostic heuristic used by the scraper by default.
///
/// It knows nothing about token standards, so ERC-20 amounts that happen to look like
/// padded addresses are indexed as addresses. Such false records are kept so that
/// re-scraping reproduces the published index exactly.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChainAgnosticPolicy;

impl ChainAgnosticPolicy {
    /// Addresses at or below this value are the zero address or EIP-1352 precompiles
    pub const PRECOMPILE_CEILING: &'static str = "0x000000000000000000000000000000000000ffff";

    /// 32-byte words at or below this value are treated as amounts
    pub const SMALL_VALUE_FLOOR: &'static str =
        "00000000000000000000000000000000000000ffffffffffffffffffffffffff";

    const PADDING_PREFIX: &'static str = "000000000000000000000000";
    const ZERO_SUFFIX: &'static str = "00000000";
}

fn is_lower_hex(text: &str) -> bool {
    text.bytes()
        .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

impl AddressPolicy for ChainAgnosticPolicy {
    fn is_good_address(&self, address: &str) -> bool {
        let Some(body) = address.strip_prefix("0x") else {
            return false;
        };
        body.len() == 40 && is_lower_hex(body) && address > Self::PRECOMPILE_CEILING
    }

    fn is_potential_address(&self, word: &str) -> bool {
        word.len() == 64
            && is_lower_hex(word)
            && word > Self::SMALL_VALUE_FLOOR
            && word.starts_with(Self::PADDING_PREFIX)
            && !word.ends_with(Self::ZERO_SUFFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICY: ChainAgnosticPolicy = ChainAgnosticPolicy;

    #[test]
    fn test_precompiles_are_not_good() {
        assert!(!POLICY.is_good_address("0x0000000000000000000000000000000000000000"));
        assert!(!POLICY.is_good_address("0x0000000000000000000000000000000000000001"));
        assert!(!POLICY.is_good_address(ChainAgnosticPolicy::PRECOMPILE_CEILING));
        assert!(POLICY.is_good_address("0x0000000000000000000000000000000000010000"));
    }

    #[test]
    fn test_malformed_addresses_are_not_good() {
        assert!(!POLICY.is_good_address(""));
        assert!(!POLICY.is_good_address("0x"));
        assert!(!POLICY.is_good_address("0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc"));
        assert!(!POLICY.is_good_address("0xC02AAA39B223FE8D0A0E5C4F27EAD9083C756CC2"));
        assert!(!POLICY.is_good_address("c02aaa39b223fe8d0a0e5c4f27ead9083c756cc2"));
    }

    #[test]
    fn test_regular_address_is_good() {
        assert!(POLICY.is_good_address("0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2"));
    }

    #[test]
    fn test_potential_address_floor_is_exclusive() {
        assert!(!POLICY.is_potential_address(ChainAgnosticPolicy::SMALL_VALUE_FLOOR));
        assert!(POLICY.is_potential_address(
            "0000000000000000000000000000000000000100000000000000000000000001"
        ));
    }

    #[test]
    fn test_potential_address_needs_twelve_zero_bytes() {
        assert!(!POLICY.is_potential_address(
            "0000000000000000000000010000000000000000000000000000000000000001"
        ));
        assert!(POLICY.is_potential_address(
            "000000000000000000000000c02aaa39b223fe8d0a0e5c4f27ead9083c756cc2"
        ));
    }

    #[test]
    fn test_potential_address_rejects_trailing_zero_bytes() {
        assert!(!POLICY.is_potential_address(
            "000000000000000000000000c02aaa39b223fe8d0a0e5c4f27ead90800000000"
        ));
        assert!(POLICY.is_potential_address(
            "000000000000000000000000c02aaa39b223fe8d0a0e5c4f27ead90800000001"
        ));
    }

    #[test]
    fn test_potential_address_rejects_wrong_length() {
        assert!(!POLICY.is_potential_address("000000000000000000000000c02aaa39b223fe8d"));
    }

    #[test]
    fn test_token_amount_false_positive_is_kept() {
        // A transfer amount with enough high-order bits set passes the heuristic.
        assert!(POLICY.is_potential_address(
            "00000000000000000000000000000000000004ee2d6d415371e298f092cc0001"
        ));
    }
}
