//! Proof-of-work threshold.

use crate::error::ChainError;
use std::fmt;

/// A 256-bit big-endian upper bound on block hashes. Smaller is harder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Target([u8; 32]);

impl Target {
    /// Every hash meets this target.
    pub const MAX: Target = Target([0xff; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Target(bytes)
    }

    /// Target whose first `bits` bits are zero and the rest are one.
    pub fn from_leading_zero_bits(bits: u32) -> Self {
        let mut target = [0xFF; 32];
        let leading_zeros = (bits / 8).min(32);
        let partial_bits = bits % 8;

        for item in target.iter_mut().take(leading_zeros as usize) {
            *item = 0;
        }

        if leading_zeros < 32 && partial_bits > 0 {
            target[leading_zeros as usize] = 0xFF >> partial_bits;
        }
        Target(target)
    }

    /// Parses a hex number of at most 64 digits, with or without `0x`.
    /// Shorter inputs are left-padded with zeros.
    pub fn from_hex(s: &str) -> Result<Self, ChainError> {
        let digits = s.trim().trim_start_matches("0x").trim_start_matches("0X");
        if digits.is_empty() || digits.len() > 64 {
            return Err(ChainError::ConfigError(format!(
                "Target must have between 1 and 64 hex digits, got {}",
                digits.len()
            )));
        }
        let padded = format!("{:0>64}", digits);
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(&padded, &mut bytes)
            .map_err(|e| ChainError::ConfigError(format!("Invalid target hex: {}", e)))?;
        Ok(Target(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// True when `digest`, read as an unsigned big-endian integer, is at most the target.
    pub fn is_met_by(&self, digest: &[u8; 32]) -> bool {
        digest <= &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Default for Target {
    fn default() -> Self {
        Target::from_leading_zero_bits(8)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl TryFrom<String> for Target {
    type Error = ChainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Target::from_hex(&value)
    }
}

impl From<Target> for String {
    fn from(target: Target) -> Self {
        target.to_hex()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_has_one_zero_byte() {
        let target = Target::default();
        assert_eq!(target.as_bytes()[0], 0);
        assert!(target.as_bytes()[1..].iter().all(|b| *b == 0xff));
    }

    #[test]
    fn test_partial_bits() {
        let target = Target::from_leading_zero_bits(12);
        assert_eq!(target.as_bytes()[0], 0x00);
        assert_eq!(target.as_bytes()[1], 0x0f);
        assert_eq!(target.as_bytes()[2], 0xff);
    }

    #[test]
    fn test_comparison_is_big_endian() {
        let target = Target::from_leading_zero_bits(8);
        let mut low = [0xffu8; 32];
        low[0] = 0x00;
        let mut high = [0x00u8; 32];
        high[0] = 0x01;

        assert!(target.is_met_by(&low));
        assert!(!target.is_met_by(&high));
        assert!(Target::MAX.is_met_by(&[0xff; 32]));
    }

    #[test]
    fn test_from_hex_pads_short_input() {
        let target = Target::from_hex("0x00ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff").unwrap();
        assert_eq!(target, Target::default());

        let small = Target::from_hex("ff").unwrap();
        assert_eq!(small.as_bytes()[31], 0xff);
        assert!(small.as_bytes()[..31].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_from_hex_rejects_garbage() {
        assert!(Target::from_hex("").is_err());
        assert!(Target::from_hex("xyz").is_err());
        assert!(Target::from_hex(&"f".repeat(65)).is_err());
    }

    #[test]
    fn test_serde_as_hex_string() {
        let json = serde_json::to_string(&Target::MAX).unwrap();
        assert_eq!(json, format!("\"{}\"", "f".repeat(64)));
        let back: Target = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Target::MAX);
    }
}
