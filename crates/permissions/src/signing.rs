// SPDX-License-Identifier: MIT

//! Delegation token signing and verification: HMAC-SHA256 for same-node
//! delegation, Ed25519 for cross-node. Both paths sign/verify the token's
//! [`SignedFields`] canonical byte form, never the parsed struct.

use crate::error::PermissionError;
use ak_core::{DelegationToken, SignatureAlgorithm};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Key material available to this node for issuing and verifying delegation
/// tokens. A node typically holds the HMAC shared secret (for delegating to
/// sessions on the same node) and, optionally, its own Ed25519 signing key
/// plus the verifying keys of peer nodes (for cross-node delegation).
pub enum SigningKeys {
    Hmac { secret: Vec<u8> },
    Ed25519 { signing: SigningKey, verifying: VerifyingKey },
}

impl SigningKeys {
    pub fn hmac(secret: impl Into<Vec<u8>>) -> Self {
        SigningKeys::Hmac { secret: secret.into() }
    }

    pub fn ed25519(signing: SigningKey) -> Self {
        let verifying = signing.verifying_key();
        SigningKeys::Ed25519 { signing, verifying }
    }

    pub fn algorithm(&self) -> SignatureAlgorithm {
        match self {
            SigningKeys::Hmac { .. } => SignatureAlgorithm::HmacSha256,
            SigningKeys::Ed25519 { .. } => SignatureAlgorithm::Ed25519,
        }
    }

    /// Signs `token`'s canonical signed fields, returning the hex-encoded
    /// signature/MAC to store in `DelegationToken::signature`.
    pub fn sign(&self, token: &DelegationToken) -> Result<String, PermissionError> {
        let bytes = token.signed_fields().canonical_bytes()?;
        match self {
            SigningKeys::Hmac { secret } => {
                let mut mac = HmacSha256::new_from_slice(secret)
                    .map_err(|_| PermissionError::KeyUnavailable(SignatureAlgorithm::HmacSha256))?;
                mac.update(&bytes);
                Ok(hex::encode(mac.finalize().into_bytes()))
            }
            SigningKeys::Ed25519 { signing, .. } => {
                let signature = signing.sign(&bytes);
                Ok(hex::encode(signature.to_bytes()))
            }
        }
    }

    /// Verifies `token.signature` in constant time against the recomputed
    /// MAC / signature over the canonical signed fields.
    pub fn verify(&self, token: &DelegationToken) -> Result<bool, PermissionError> {
        if token.algorithm != self.algorithm() {
            return Ok(false);
        }
        let bytes = token.signed_fields().canonical_bytes()?;
        let Ok(given) = hex::decode(&token.signature) else {
            return Ok(false);
        };

        match self {
            SigningKeys::Hmac { secret } => {
                let mut mac = HmacSha256::new_from_slice(secret)
                    .map_err(|_| PermissionError::KeyUnavailable(SignatureAlgorithm::HmacSha256))?;
                mac.update(&bytes);
                let expected = mac.finalize().into_bytes();
                if expected.len() != given.len() {
                    return Ok(false);
                }
                Ok(bool::from(expected.as_slice().ct_eq(&given)))
            }
            SigningKeys::Ed25519 { verifying, .. } => {
                let Ok(sig_bytes): Result<[u8; 64], _> = given.try_into() else {
                    return Ok(false);
                };
                let signature = Signature::from_bytes(&sig_bytes);
                Ok(verifying.verify(&bytes, &signature).is_ok())
            }
        }
    }
}
