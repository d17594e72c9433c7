//! Unlocks: one per transaction input, proving the spender may consume it.

use serde::{Deserialize, Serialize};

use crate::block::packable::{Packable, UnpackError, Unpacker};
use crate::crypto::keys::{Ed25519PublicKey, Ed25519Signature};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureUnlock {
    pub public_key: Ed25519PublicKey,
    pub signature: Ed25519Signature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Unlock {
    /// Ed25519 signature over the essence hash.
    Signature(SignatureUnlock),
    /// Reuses the signature unlock at `reference`.
    Reference { reference: u16 },
    /// Input is owned by the alias consumed at `reference`.
    Alias { reference: u16 },
    /// Input is owned by the NFT consumed at `reference`.
    Nft { reference: u16 },
}

impl Unlock {
    pub const SIGNATURE: u8 = 0;
    pub const REFERENCE: u8 = 1;
    pub const ALIAS: u8 = 2;
    pub const NFT: u8 = 3;

    const ED25519_SIGNATURE: u8 = 0;

    pub fn kind(&self) -> u8 {
        match self {
            Unlock::Signature(_) => Self::SIGNATURE,
            Unlock::Reference { .. } => Self::REFERENCE,
            Unlock::Alias { .. } => Self::ALIAS,
            Unlock::Nft { .. } => Self::NFT,
        }
    }
}

impl Packable for Unlock {
    fn pack(&self, buf: &mut Vec<u8>) {
        buf.push(self.kind());
        match self {
            Unlock::Signature(s) => {
                buf.push(Self::ED25519_SIGNATURE);
                buf.extend_from_slice(s.public_key.as_bytes());
                buf.extend_from_slice(s.signature.as_bytes());
            }
            Unlock::Reference { reference }
            | Unlock::Alias { reference }
            | Unlock::Nft { reference } => buf.extend_from_slice(&reference.to_le_bytes()),
        }
    }

    fn unpack(unpacker: &mut Unpacker<'_>) -> Result<Self, UnpackError> {
        Ok(match unpacker.read_u8()? {
            Self::SIGNATURE => {
                let kind = unpacker.read_u8()?;
                if kind != Self::ED25519_SIGNATURE {
                    return Err(UnpackError::InvalidTag {
                        what: "signature",
                        tag: kind,
                    });
                }
                Unlock::Signature(SignatureUnlock {
                    public_key: Ed25519PublicKey(unpacker.read_array()?),
                    signature: Ed25519Signature(unpacker.read_array()?),
                })
            }
            Self::REFERENCE => Unlock::Reference {
                reference: unpacker.read_u16()?,
            },
            Self::ALIAS => Unlock::Alias {
                reference: unpacker.read_u16()?,
            },
            Self::NFT => Unlock::Nft {
                reference: unpacker.read_u16()?,
            },
            tag => return Err(UnpackError::InvalidTag { what: "unlock", tag }),
        })
    }
}

/// Checks that reference-style unlocks point backwards at a valid target.
pub(crate) fn verify_unlock_references(unlocks: &[Unlock]) -> Result<(), String> {
    for (index, unlock) in unlocks.iter().enumerate() {
        match unlock {
            Unlock::Signature(_) => {}
            Unlock::Reference { reference } => {
                let target = *reference as usize;
                if target >= index || !matches!(unlocks[target], Unlock::Signature(_)) {
                    return Err(format!(
                        "reference unlock {index} must point to an earlier signature unlock"
                    ));
                }
            }
            Unlock::Alias { reference } | Unlock::Nft { reference } => {
                if *reference as usize >= index {
                    return Err(format!("chain unlock {index} must point to an earlier input"));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::Ed25519Keypair;

    fn signature() -> Unlock {
        let keypair = Ed25519Keypair::from_seed(&[1; 32]);
        Unlock::Signature(SignatureUnlock {
            public_key: keypair.public_key(),
            signature: keypair.sign(b"essence"),
        })
    }

    #[test]
    fn signature_unlock_is_98_bytes() {
        assert_eq!(signature().packed_len(), 1 + 1 + 32 + 64);
    }

    #[test]
    fn forward_reference_is_rejected() {
        let unlocks = [Unlock::Reference { reference: 1 }, signature()];
        assert!(verify_unlock_references(&unlocks).is_err());
    }

    #[test]
    fn reference_to_reference_is_rejected() {
        let unlocks = [
            signature(),
            Unlock::Reference { reference: 0 },
            Unlock::Reference { reference: 1 },
        ];
        assert!(verify_unlock_references(&unlocks).is_err());
    }

    #[test]
    fn backward_chain_reference_is_accepted() {
        let unlocks = [signature(), Unlock::Alias { reference: 0 }];
        verify_unlock_references(&unlocks).unwrap();
    }
}
