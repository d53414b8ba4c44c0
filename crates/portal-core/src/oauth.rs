//! OAuth 2.0 helpers for the social verification flows.
//!
//! The authorize redirect carries a PKCE challenge and a `state` token. The
//! state is `base64url(claims_json) "." base64url(ed25519_signature)`, so the
//! callback can prove the redirect was started by us for a given wallet
//! without any server-side session.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::address::Address;
use crate::error::PortalError;

pub const PKCE_METHOD: &str = "S256";

const KEY_SIZE: usize = 32;
const VERIFIER_BYTES: usize = 32;
const NONCE_BYTES: usize = 16;

/// PKCE verifier/challenge pair. The verifier stays with the caller until the
/// token exchange; only the challenge goes to the provider.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

impl PkcePair {
    pub fn generate() -> Self {
        let mut bytes = [0u8; VERIFIER_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let verifier = URL_SAFE_NO_PAD.encode(bytes);
        let challenge = challenge_for(&verifier);
        Self {
            verifier,
            challenge,
        }
    }
}

/// S256 code challenge: `base64url(sha256(verifier))` without padding.
pub fn challenge_for(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Payload signed into the `state` parameter.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateClaims {
    pub address: Address,
    pub provider: String,
    pub nonce: String,
    pub issued_at: i64,
}

impl StateClaims {
    pub fn new(address: Address, provider: impl Into<String>, issued_at: i64) -> Self {
        let mut nonce = [0u8; NONCE_BYTES];
        OsRng.fill_bytes(&mut nonce);
        Self {
            address,
            provider: provider.into(),
            nonce: hex::encode(nonce),
            issued_at,
        }
    }
}

pub struct StateSigner {
    key: SigningKey,
}

impl StateSigner {
    pub fn generate() -> Self {
        Self {
            key: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PortalError> {
        let secret: [u8; KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| PortalError::InvalidKey("signing key must be 32 bytes"))?;
        Ok(Self {
            key: SigningKey::from_bytes(&secret),
        })
    }

    pub fn to_bytes(&self) -> [u8; KEY_SIZE] {
        self.key.to_bytes()
    }

    pub fn verifier(&self) -> StateVerifier {
        StateVerifier {
            key: self.key.verifying_key(),
        }
    }

    pub fn issue(&self, claims: &StateClaims) -> Result<String, PortalError> {
        let payload = serde_json::to_vec(claims)?;
        let signature = self.key.sign(&payload);
        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(signature.to_bytes())
        ))
    }
}

#[derive(Clone, Debug)]
pub struct StateVerifier {
    key: VerifyingKey,
}

impl StateVerifier {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PortalError> {
        let public: [u8; KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| PortalError::InvalidKey("public key must be 32 bytes"))?;
        let key = VerifyingKey::from_bytes(&public)
            .map_err(|_| PortalError::InvalidKey("not an ed25519 public key"))?;
        Ok(Self { key })
    }

    pub fn to_bytes(&self) -> [u8; KEY_SIZE] {
        self.key.to_bytes()
    }

    /// Check signature and age of a state token issued by [`StateSigner::issue`].
    ///
    /// `now` and `issued_at` are unix seconds; tokens dated in the future are
    /// treated like expired ones.
    pub fn verify(
        &self,
        token: &str,
        now: i64,
        max_age_secs: i64,
    ) -> Result<StateClaims, PortalError> {
        let (payload_b64, signature_b64) = token
            .trim()
            .split_once('.')
            .ok_or(PortalError::MalformedState("missing separator"))?;
        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| PortalError::MalformedState("payload is not base64url"))?;
        let signature_bytes = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| PortalError::MalformedState("signature is not base64url"))?;
        let signature = Signature::from_slice(&signature_bytes)
            .map_err(|_| PortalError::MalformedState("signature length"))?;
        self.key
            .verify_strict(&payload, &signature)
            .map_err(|_| PortalError::StateSignature)?;

        let claims: StateClaims = serde_json::from_slice(&payload)
            .map_err(|_| PortalError::MalformedState("claims"))?;
        let age = now - claims.issued_at;
        if age < 0 || age > max_age_secs {
            return Err(PortalError::StateExpired);
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Address {
        Address::parse("0x00000000000000000000000000000000000a11ce").unwrap()
    }

    #[test]
    fn pkce_challenge_matches_rfc7636_vector() {
        // RFC 7636, appendix B
        let challenge = challenge_for("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");
        assert_eq!(challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");

        let pair = PkcePair::generate();
        assert_eq!(pair.verifier.len(), 43);
        assert_eq!(pair.challenge, challenge_for(&pair.verifier));
    }

    #[test]
    fn state_round_trip_within_window() {
        let signer = StateSigner::generate();
        let claims = StateClaims::new(alice(), "twitter", 1_000);
        let token = signer.issue(&claims).unwrap();
        let decoded = signer.verifier().verify(&token, 1_300, 600).unwrap();
        assert_eq!(decoded, claims);
    }

    #[test]
    fn state_rejects_expired_and_future_tokens() {
        let signer = StateSigner::generate();
        let token = signer
            .issue(&StateClaims::new(alice(), "twitter", 1_000))
            .unwrap();
        let verifier = signer.verifier();
        assert!(matches!(
            verifier.verify(&token, 1_601, 600),
            Err(PortalError::StateExpired)
        ));
        assert!(matches!(
            verifier.verify(&token, 999, 600),
            Err(PortalError::StateExpired)
        ));
    }

    #[test]
    fn state_rejects_foreign_key_and_tampering() {
        let signer = StateSigner::generate();
        let token = signer
            .issue(&StateClaims::new(alice(), "telegram", 50))
            .unwrap();

        let other = StateSigner::generate().verifier();
        assert!(matches!(
            other.verify(&token, 60, 600),
            Err(PortalError::StateSignature)
        ));

        let (_, signature) = token.split_once('.').unwrap();
        let forged_claims = StateClaims::new(alice(), "twitter", 50);
        let forged = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged_claims).unwrap()),
            signature
        );
        assert!(matches!(
            signer.verifier().verify(&forged, 60, 600),
            Err(PortalError::StateSignature)
        ));
        assert!(matches!(
            signer.verifier().verify("no-separator", 60, 600),
            Err(PortalError::MalformedState(_))
        ));
    }

    #[test]
    fn keys_survive_byte_round_trip() {
        let signer = StateSigner::generate();
        let restored = StateSigner::from_bytes(&signer.to_bytes()).unwrap();
        let token = restored
            .issue(&StateClaims::new(alice(), "twitter", 5))
            .unwrap();
        let verifier = StateVerifier::from_bytes(&signer.verifier().to_bytes()).unwrap();
        assert!(verifier.verify(&token, 5, 60).is_ok());
        assert!(StateSigner::from_bytes(&[0u8; 31]).is_err());
    }
}
