use std::sync::Arc;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest as _, Sha256};
use strata_types::error::IntegrityError;
use strata_types::event::Event;
use strata_types::ids::IntegrityToken;

/// Canonicalize `event` for integrity purposes: JSON with lexicographically
/// sorted keys, no insignificant whitespace, numbers in shortest
/// round-trip form, byte values hex-lowercase (enforced by `Digest`'s and
/// `IntegrityToken`'s own `Serialize` impls), and the `integrity` field
/// excluded (spec §4.5).
///
/// `serde_json::Value`'s default map representation is a `BTreeMap`,
/// which gives us lexicographic key ordering for free as long as the
/// `preserve_order` feature is not enabled anywhere in the dependency
/// graph — this workspace never enables it.
pub fn canonicalize_for_integrity(event: &Event) -> Result<Vec<u8>, serde_json::Error> {
    let mut value = serde_json::to_value(event)?;
    if let serde_json::Value::Object(ref mut map) = value {
        map.remove("integrity");
    }
    serde_json::to_vec(&value)
}

/// Resolves an author identifier to signing/verifying key material for
/// the signature integrity mode. Installations provide their own
/// implementation (e.g. backed by a local keyring file); this crate only
/// consumes the trait.
pub trait AuthorKeystore: Send + Sync {
    /// The author's private key, used to sign events they submit.
    fn signing_key(&self, author: &str) -> Option<SigningKey>;
    /// The author's public key, used to verify events attributed to them.
    fn verifying_key(&self, author: &str) -> Option<VerifyingKey>;
}

/// The configured integrity mode for one installation (spec §4.5).
#[derive(Clone)]
pub enum Integrity {
    /// `token_n = SHA-256(canonical(event_n) || token_{n-1})`. Default.
    HashChain,
    /// `token_n = Ed25519_sign(author_secret_key, canonical(event_n))`.
    /// Anticipates future multi-writer federation; ordering within one
    /// installation still comes from append position (spec §4.5, Non-goals).
    Signature(Arc<dyn AuthorKeystore>),
}

impl Integrity {
    /// Compute the integrity token for `event`, given the previous
    /// event's token (`IntegrityToken::empty()` for the first event).
    pub fn compute_token(
        &self,
        event: &Event,
        previous: &IntegrityToken,
    ) -> Result<IntegrityToken, IntegrityError> {
        let canonical = canonicalize_for_integrity(event)
            .map_err(|e| IntegrityError::SignatureInvalid(format!("canonicalization failed: {e}")))?;
        match self {
            Integrity::HashChain => {
                let mut hasher = Sha256::new();
                hasher.update(&canonical);
                hasher.update(&previous.0);
                Ok(IntegrityToken(hasher.finalize().to_vec()))
            }
            Integrity::Signature(keystore) => {
                let key = keystore.signing_key(&event.author).ok_or_else(|| {
                    IntegrityError::SignatureInvalid(format!("no signing key for author {}", event.author))
                })?;
                let signature: Signature = key.sign(&canonical);
                Ok(IntegrityToken(signature.to_bytes().to_vec()))
            }
        }
    }

    /// Verify that `event.integrity` is the correct token given
    /// `previous`, without recomputing it as a fresh value first.
    pub fn verify_token(
        &self,
        event: &Event,
        previous: &IntegrityToken,
    ) -> Result<(), IntegrityError> {
        match self {
            Integrity::HashChain => {
                let expected = self.compute_token(event, previous)?;
                if expected == event.integrity {
                    Ok(())
                } else {
                    Err(IntegrityError::ChainBroken(0))
                }
            }
            Integrity::Signature(keystore) => {
                let canonical = canonicalize_for_integrity(event).map_err(|e| {
                    IntegrityError::SignatureInvalid(format!("canonicalization failed: {e}"))
                })?;
                let key = keystore.verifying_key(&event.author).ok_or_else(|| {
                    IntegrityError::SignatureInvalid(format!("no verifying key for author {}", event.author))
                })?;
                let sig_bytes: [u8; 64] = event
                    .integrity
                    .0
                    .as_slice()
                    .try_into()
                    .map_err(|_| IntegrityError::SignatureInvalid("malformed signature length".into()))?;
                let signature = Signature::from_bytes(&sig_bytes);
                key.verify(&canonical, &signature)
                    .map_err(|e| IntegrityError::SignatureInvalid(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use strata_types::event::EventBody;
    use uuid::Uuid;

    fn sample_event() -> Event {
        Event::new(Uuid::new_v4(), "alice".into(), Utc::now(), EventBody::OwnerAdd { owner: "alice".into() })
    }

    #[test]
    fn hash_chain_is_deterministic_given_same_previous() {
        let integrity = Integrity::HashChain;
        let event = sample_event();
        let t1 = integrity.compute_token(&event, &IntegrityToken::empty()).unwrap();
        let t2 = integrity.compute_token(&event, &IntegrityToken::empty()).unwrap();
        assert_eq!(t1, t2);
    }

    #[test]
    fn hash_chain_depends_on_previous_token() {
        let integrity = Integrity::HashChain;
        let event = sample_event();
        let t1 = integrity.compute_token(&event, &IntegrityToken::empty()).unwrap();
        let t2 = integrity.compute_token(&event, &IntegrityToken(vec![1, 2, 3])).unwrap();
        assert_ne!(t1, t2);
    }

    #[test]
    fn hash_chain_excludes_integrity_field_from_canonical_form() {
        let mut event = sample_event();
        let bytes_before = canonicalize_for_integrity(&event).unwrap();
        event.integrity = IntegrityToken(vec![9, 9, 9]);
        let bytes_after = canonicalize_for_integrity(&event).unwrap();
        assert_eq!(bytes_before, bytes_after);
    }

    #[test]
    fn verify_token_accepts_correct_chain_and_rejects_tampering() {
        let integrity = Integrity::HashChain;
        let mut event = sample_event();
        event.integrity = integrity.compute_token(&event, &IntegrityToken::empty()).unwrap();
        assert!(integrity.verify_token(&event, &IntegrityToken::empty()).is_ok());

        event.integrity = IntegrityToken(vec![0; 32]);
        assert!(integrity.verify_token(&event, &IntegrityToken::empty()).is_err());
    }

    struct StaticKeystore {
        signing: SigningKey,
    }

    impl AuthorKeystore for StaticKeystore {
        fn signing_key(&self, _author: &str) -> Option<SigningKey> {
            Some(self.signing.clone())
        }
        fn verifying_key(&self, _author: &str) -> Option<VerifyingKey> {
            Some(self.signing.verifying_key())
        }
    }

    #[test]
    fn signature_mode_round_trips() {
        let signing = SigningKey::from_bytes(&[7u8; 32]);
        let keystore = Arc::new(StaticKeystore { signing });
        let integrity = Integrity::Signature(keystore);
        let mut event = sample_event();
        event.integrity = integrity.compute_token(&event, &IntegrityToken::empty()).unwrap();
        assert!(integrity.verify_token(&event, &IntegrityToken::empty()).is_ok());
    }
}
