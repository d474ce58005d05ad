//! Recoverable ECDSA signatures over secp256k1.
//!
//! Headers and confirms carry 65-byte signatures (`r ‖ s ‖ recovery id`).
//! The signer is never transmitted; it is recovered from the signature and
//! compared against the registered deputy node id.

use crate::address::NodeId;
use crate::hash::Hash;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, PublicKey, SecretKey, SECP256K1};
use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Errors from signature handling.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// The 65-byte signature could not be parsed or did not recover a key.
    #[error("invalid signature data")]
    InvalidSignature,

    /// A secret key was outside the valid scalar range.
    #[error("invalid secret key")]
    InvalidSecretKey,
}

/// A 65-byte recoverable signature.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignData(pub [u8; 65]);

impl SignData {
    /// The all-zero placeholder used before a header is signed.
    pub fn zero() -> SignData {
        SignData([0u8; 65])
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Recover the signer's node id for the given message hash.
    pub fn recover_node_id(&self, hash: &Hash) -> Result<NodeId, CryptoError> {
        let recovery_id = RecoveryId::from_i32(i32::from(self.0[64]))
            .map_err(|_| CryptoError::InvalidSignature)?;
        let signature = RecoverableSignature::from_compact(&self.0[..64], recovery_id)
            .map_err(|_| CryptoError::InvalidSignature)?;
        let message = Message::from_digest(hash.0);
        let public = SECP256K1
            .recover_ecdsa(&message, &signature)
            .map_err(|_| CryptoError::InvalidSignature)?;
        Ok(node_id_of(&public))
    }
}

impl fmt::Debug for SignData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SignData(0x{}…)", hex::encode(&self.0[..6]))
    }
}

impl Default for SignData {
    fn default() -> Self {
        SignData::zero()
    }
}

impl Serialize for SignData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for SignData {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SignDataVisitor;
        impl<'de> Visitor<'de> for SignDataVisitor {
            type Value = SignData;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("65 bytes")
            }

            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<SignData, E> {
                if v.len() != 65 {
                    return Err(E::invalid_length(v.len(), &self));
                }
                let mut out = [0u8; 65];
                out.copy_from_slice(v);
                Ok(SignData(out))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<SignData, A::Error> {
                let mut out = [0u8; 65];
                for (i, byte) in out.iter_mut().enumerate() {
                    *byte = seq
                        .next_element()?
                        .ok_or_else(|| de::Error::invalid_length(i, &self))?;
                }
                Ok(SignData(out))
            }
        }
        deserializer.deserialize_bytes(SignDataVisitor)
    }
}

/// A signing identity: secp256k1 secret key plus the derived node id.
#[derive(Clone)]
pub struct KeyPair {
    secret: SecretKey,
    node_id: NodeId,
}

impl KeyPair {
    /// Build a keypair from raw secret-key bytes.
    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Result<KeyPair, CryptoError> {
        let secret = SecretKey::from_slice(bytes).map_err(|_| CryptoError::InvalidSecretKey)?;
        let public = PublicKey::from_secret_key(SECP256K1, &secret);
        Ok(KeyPair {
            secret,
            node_id: node_id_of(&public),
        })
    }

    /// The 64-byte node id of this key.
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Sign a 32-byte message hash, producing the wire signature layout.
    pub fn sign(&self, hash: &Hash) -> SignData {
        let message = Message::from_digest(hash.0);
        let signature = SECP256K1.sign_ecdsa_recoverable(&message, &self.secret);
        let (recovery_id, compact) = signature.serialize_compact();
        let mut out = [0u8; 65];
        out[..64].copy_from_slice(&compact);
        out[64] = recovery_id.to_i32() as u8;
        SignData(out)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print the secret.
        f.debug_struct("KeyPair").field("node_id", &self.node_id).finish()
    }
}

fn node_id_of(public: &PublicKey) -> NodeId {
    let uncompressed = public.serialize_uncompressed();
    let mut out = [0u8; 64];
    out.copy_from_slice(&uncompressed[1..]);
    NodeId(out)
}
