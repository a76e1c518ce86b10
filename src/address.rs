//! 20-byte address identifiers with a bech32 prefix indicating asset family
//! (spec §6: `"nhb"`, `"znhb"`). The teacher's `Address` is a bare `String`
//! with no codec; this is grounded on the `bech32` crate usage seen in the
//! wider example pack's Acala/Chainflip manifests.

use bech32::{FromBase32, ToBase32, Variant};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{EngineError, Result};

pub const HRP_NHB: &str = "nhb";
pub const HRP_ZNHB: &str = "znhb";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 20 {
            return Err(EngineError::InvalidAmount {
                reason: format!("address must be 20 bytes, got {}", bytes.len()),
            });
        }
        let mut out = [0u8; 20];
        out.copy_from_slice(bytes);
        Ok(Address(out))
    }

    pub fn encode_bech32(&self, hrp: &str) -> Result<String> {
        bech32::encode(hrp, self.0.to_base32(), Variant::Bech32).map_err(|e| {
            EngineError::InvalidAmount {
                reason: format!("bech32 encode failed: {e}"),
            }
        })
    }

    pub fn parse_bech32(s: &str) -> Result<(String, Self)> {
        let (hrp, data, variant) = bech32::decode(s).map_err(|e| EngineError::InvalidAmount {
            reason: format!("bech32 decode failed: {e}"),
        })?;
        if variant != Variant::Bech32 {
            return Err(EngineError::InvalidAmount {
                reason: "unsupported bech32 variant".to_string(),
            });
        }
        let bytes = Vec::<u8>::from_base32(&data).map_err(|e| EngineError::InvalidAmount {
            reason: format!("bech32 base32 decode failed: {e}"),
        })?;
        Ok((hrp, Address::from_slice(&bytes)?))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bech32_roundtrip() {
        let addr = Address([7u8; 20]);
        let encoded = addr.encode_bech32(HRP_NHB).unwrap();
        assert!(encoded.starts_with("nhb1"));
        let (hrp, decoded) = Address::parse_bech32(&encoded).unwrap();
        assert_eq!(hrp, HRP_NHB);
        assert_eq!(decoded, addr);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(Address::from_slice(&[0u8; 19]).is_err());
    }
}
