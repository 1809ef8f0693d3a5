//! Digest signing and verification.
//!
//! Signatures are RSASSA-PKCS1-v1_5 over SHA-256. The signed value is the
//! SHA-256 of the digest record's raw hex text, not the package digest
//! itself; the two-stage hash is part of the wire contract and verifiers
//! must reproduce it.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use num_bigint_dig::ModInverse;
use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPublicKey, EncodeRsaPublicKey};
use rsa::{BigUint, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};

use crate::secrets::{CrtComponents, FactorySecrets};
use crate::ProvisionError;

/// Smallest accepted RSA modulus.
pub const MIN_KEY_BITS: usize = 2048;
/// Fixed public exponent.
pub const PUBLIC_EXPONENT: u64 = 65537;

/// Where the run's signing key comes from.
///
/// `Imported` reconstructs the key from factory-secret CRT components and
/// is the production path: the public key stays stable across runs.
/// `Ephemeral` generates a throwaway pair and exists for isolated testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyProvider {
    Imported,
    Ephemeral { bits: usize },
}

/// Holds the run's signing key pair.
pub struct SignatureService {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl std::fmt::Debug for SignatureService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureService")
            .field("private", &"[redacted]")
            .finish()
    }
}

impl SignatureService {
    pub fn new(provider: KeyProvider, secrets: &FactorySecrets) -> Result<Self, ProvisionError> {
        let private = match provider {
            KeyProvider::Imported => key_from_crt(secrets.rsa())?,
            KeyProvider::Ephemeral { bits } => {
                if bits < MIN_KEY_BITS {
                    return Err(ProvisionError::Key(format!(
                        "requested {bits}-bit key, minimum is {MIN_KEY_BITS}"
                    )));
                }
                RsaPrivateKey::new(&mut OsRng, bits)
                    .map_err(|e| ProvisionError::Key(format!("key generation failed: {e}")))?
            }
        };
        let public = RsaPublicKey::from(&private);
        Ok(Self { private, public })
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    /// Base64 PKCS#1 DER of the public key, the single-line form embedded
    /// in package headers and consumed by `decode_public_key_b64`.
    pub fn public_key_b64(&self) -> Result<String, ProvisionError> {
        let der = self
            .public
            .to_pkcs1_der()
            .map_err(|e| ProvisionError::Key(format!("public key encoding failed: {e}")))?;
        Ok(STANDARD.encode(der.as_bytes()))
    }

    /// Sign the raw bytes of a digest record.
    pub fn sign_digest_text(&self, digest_text: &[u8]) -> Result<Vec<u8>, ProvisionError> {
        let hashed = Sha256::digest(digest_text);
        self.private
            .sign(Pkcs1v15Sign::new::<Sha256>(), &hashed)
            .map_err(|e| ProvisionError::Sign(e.to_string()))
    }
}

/// Consumer-side check: reproduce the two-stage hash and verify the
/// signature against the given public key.
pub fn verify_digest_text(digest_text: &[u8], signature: &[u8], public: &RsaPublicKey) -> bool {
    let hashed = Sha256::digest(digest_text);
    public
        .verify(Pkcs1v15Sign::new::<Sha256>(), &hashed, signature)
        .is_ok()
}

/// Decode a public key from the base64 PKCS#1 DER text form.
pub fn decode_public_key_b64(text: &str) -> Result<RsaPublicKey, ProvisionError> {
    let der = STANDARD
        .decode(text.trim().as_bytes())
        .map_err(|_| ProvisionError::Key("invalid base64 public key".to_string()))?;
    RsaPublicKey::from_pkcs1_der(&der)
        .map_err(|e| ProvisionError::Key(format!("invalid public key encoding: {e}")))
}

/// Rebuild the private key from factory CRT components.
///
/// `d` is recovered as the inverse of `e` modulo `(p-1)(q-1)`; the supplied
/// `dP`, `dQ` and `qInv` are then cross-checked against the reconstruction
/// so corrupted secrets fail here instead of producing bad signatures.
fn key_from_crt(rsa: &CrtComponents) -> Result<RsaPrivateKey, ProvisionError> {
    let p = BigUint::from_bytes_be(&rsa.p);
    let q = BigUint::from_bytes_be(&rsa.q);
    let one = BigUint::from(1u32);
    if p <= one || q <= one {
        return Err(ProvisionError::Key("rsa primes are degenerate".to_string()));
    }
    let n = &p * &q;
    if n.bits() < MIN_KEY_BITS {
        return Err(ProvisionError::Key(format!(
            "modulus is {} bits, minimum is {MIN_KEY_BITS}",
            n.bits()
        )));
    }
    let e = BigUint::from(PUBLIC_EXPONENT);
    let phi = (&p - &one) * (&q - &one);
    let d = (&e)
        .mod_inverse(&phi)
        .and_then(|d| d.to_biguint())
        .ok_or_else(|| {
            ProvisionError::Key("public exponent is not invertible for the supplied primes".to_string())
        })?;

    let dp = &d % (&p - &one);
    let dq = &d % (&q - &one);
    let qinv = (&q)
        .mod_inverse(&p)
        .and_then(|v| v.to_biguint())
        .ok_or_else(|| ProvisionError::Key("q is not invertible modulo p".to_string()))?;
    if dp != BigUint::from_bytes_be(&rsa.dp) {
        return Err(ProvisionError::Key("dP does not match p and q".to_string()));
    }
    if dq != BigUint::from_bytes_be(&rsa.dq) {
        return Err(ProvisionError::Key("dQ does not match p and q".to_string()));
    }
    if qinv != BigUint::from_bytes_be(&rsa.qinv) {
        return Err(ProvisionError::Key("qInv does not match p and q".to_string()));
    }

    RsaPrivateKey::from_components(n, e, d, vec![p, q])
        .map_err(|e| ProvisionError::Key(format!("key reconstruction failed: {e}")))
}
