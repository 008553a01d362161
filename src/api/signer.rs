use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::pss::{BlindedSigningKey, VerifyingKey};
use rsa::rand_core::OsRng;
use rsa::signature::{Keypair, RandomizedSigner, SignatureEncoding};
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use sha2::Sha256;

use crate::config::KeySource;
use crate::error::{Error, Result};

/// RSA-PSS (MGF1-SHA256, salt = digest length) signer for API requests.
///
/// The private key stays inside the blinded signing key and is never
/// printed; `Debug` only shows the key size.
pub struct Signer {
    key: BlindedSigningKey<Sha256>,
    bits: usize,
}

impl Signer {
    /// Load the key from its configured source and validate it.
    pub fn from_source(source: &KeySource) -> Result<Self> {
        let pem = source.read_pem()?;
        Self::from_pem(&pem).map_err(|e| match e {
            Error::Config(msg) => Error::config(format!("private key from {}: {}", source, msg)),
            other => other,
        })
    }

    /// Parse an unencrypted RSA private key in PKCS#8 or PKCS#1 PEM form.
    /// Any other key type is a configuration error.
    pub fn from_pem(pem: &str) -> Result<Self> {
        let pem = pem.trim();
        let label = pem_label(pem)
            .ok_or_else(|| Error::config("private key is not PEM encoded"))?;

        let key = match label {
            "PRIVATE KEY" => match RsaPrivateKey::from_pkcs8_pem(pem) {
                Ok(key) => key,
                Err(rsa::pkcs8::Error::PublicKey(_)) => {
                    return Err(Error::config("loaded key is not an RSA private key"))
                }
                Err(e) => return Err(Error::config(format!("invalid PKCS#8 key: {}", e))),
            },
            "RSA PRIVATE KEY" => RsaPrivateKey::from_pkcs1_pem(pem)
                .map_err(|e| Error::config(format!("invalid PKCS#1 key: {}", e)))?,
            "ENCRYPTED PRIVATE KEY" => {
                return Err(Error::config("encrypted private keys are not supported"))
            }
            other => {
                return Err(Error::config(format!(
                    "loaded key is not an RSA private key ({})",
                    other
                )))
            }
        };

        Ok(Self::from_key(key))
    }

    pub fn from_key(key: RsaPrivateKey) -> Self {
        let bits = key.size() * 8;
        Self {
            key: BlindedSigningKey::<Sha256>::new(key),
            bits,
        }
    }

    /// Sign `text` and return the signature as standard base64.
    pub fn sign(&self, text: &str) -> Result<String> {
        let signature = self
            .key
            .try_sign_with_rng(&mut OsRng, text.as_bytes())
            .map_err(Error::Signing)?;
        Ok(STANDARD.encode(signature.to_bytes()))
    }

    /// Public counterpart, for verifying what this signer produced.
    pub fn verifying_key(&self) -> VerifyingKey<Sha256> {
        self.key.verifying_key()
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer").field("bits", &self.bits).finish_non_exhaustive()
    }
}

/// Label of the first PEM block, e.g. "RSA PRIVATE KEY".
fn pem_label(pem: &str) -> Option<&str> {
    let rest = pem.strip_prefix("-----BEGIN ")?;
    let end = rest.find("-----")?;
    Some(&rest[..end])
}
