//! ECDSA key pairs on `secp256k1` and the DER-signature round trip
//! (spec.md §4.4). The curve and hash primitives themselves are treated as
//! opaque, external collaborators — see spec.md §1 "Out of scope".

use secp256k1::ecdsa::Signature as DerSignature;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};

use crate::config::NetworkParams;
use crate::crypto::address::Address;

/// A secp256k1 key pair. Public key is always carried uncompressed
/// (65 bytes, leading `0x04`).
#[derive(Clone)]
pub struct EcKey {
    secret: SecretKey,
    public: PublicKey,
}

impl EcKey {
    /// Generates a new random key pair.
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let mut rng = rand::thread_rng();
        let secret = SecretKey::new(&mut rng);
        let public = PublicKey::from_secret_key(&secp, &secret);
        Self { secret, public }
    }

    pub fn from_secret_bytes(bytes: [u8; 32]) -> Result<Self, secp256k1::Error> {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(&bytes)?;
        let public = PublicKey::from_secret_key(&secp, &secret);
        Ok(Self { secret, public })
    }

    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.secret_bytes()
    }

    /// Uncompressed public key encoding: 65 bytes, `0x04 || X || Y`.
    pub fn public_key_bytes(&self) -> [u8; 65] {
        self.public.serialize_uncompressed()
    }

    /// Signs a 32-byte digest, producing a DER-encoded, non-deterministic
    /// signature (two calls over the same digest yield distinct bytes).
    pub fn sign(&self, digest: &[u8; 32]) -> Vec<u8> {
        let secp = Secp256k1::new();
        let message = Message::from_digest_slice(digest).expect("digest is exactly 32 bytes");
        let aux: [u8; 32] = rand::random();
        let signature = secp.sign_ecdsa_with_noncedata(&message, &self.secret, &aux);
        signature.serialize_der().to_vec()
    }

    /// Derives the Base58Check pay-to-address for `network` from the
    /// uncompressed public key: `hash160(pubkey)` under the network's
    /// address-header version byte.
    pub fn to_address(&self, params: &NetworkParams) -> Address {
        let hash = crate::codec::hash160(&self.public_key_bytes());
        Address::new(params.address_header, hash)
    }
}

/// Verifies a DER-encoded ECDSA signature over `digest` against an
/// uncompressed public key.
pub fn verify(digest: &[u8; 32], der_signature: &[u8], public_key: &[u8; 65]) -> bool {
    let secp = Secp256k1::new();
    let Ok(message) = Message::from_digest_slice(digest) else {
        return false;
    };
    let Ok(signature) = DerSignature::from_der(der_signature) else {
        return false;
    };
    let Ok(public_key) = PublicKey::from_slice(public_key) else {
        return false;
    };
    secp.verify_ecdsa(&message, &signature, &public_key).is_ok()
}
