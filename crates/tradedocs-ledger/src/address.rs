//! Registry address validation.

use crate::error::LedgerError;

/// A well-formed registry address: `0x` followed by 40 hex digits.
pub fn is_address(s: &str) -> bool {
    let Some(hex_part) = s.strip_prefix("0x") else {
        return false;
    };
    hex_part.len() == 40 && hex_part.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Validate an address, returning it unchanged on success.
pub fn ensure_address(s: &str) -> Result<&str, LedgerError> {
    if is_address(s) {
        Ok(s)
    } else {
        Err(LedgerError::InvalidAddress(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_addresses() {
        assert!(is_address("0x52908400098527886E0F7030069857D2E4169EE7"));
        assert!(is_address(&format!("0x{}", "ab".repeat(20))));
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(!is_address(""));
        assert!(!is_address("0x"));
        assert!(!is_address("52908400098527886E0F7030069857D2E4169EE7")); // no prefix
        assert!(!is_address("0x1234")); // too short
        assert!(!is_address(&format!("0x{}", "gg".repeat(20)))); // not hex
        assert!(!is_address(&format!("0x{}", "ab".repeat(21)))); // too long
    }

    #[test]
    fn ensure_address_reports_the_offending_input() {
        match ensure_address("0xNEW") {
            Err(LedgerError::InvalidAddress(s)) => assert_eq!(s, "0xNEW"),
            other => panic!("expected InvalidAddress, got {other:?}"),
        }
    }
}
