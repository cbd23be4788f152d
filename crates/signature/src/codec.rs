use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use tollgate_common::{TollgateError, TollgateResult};

type HmacSha256 = Hmac<Sha256>;

/// Key used when a deployment does not configure its own secret.
pub const SHARED_SECRET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// HMAC-SHA256 request signer.
///
/// A signature is `Base64(HMAC-SHA256(key, request_string || client_id))`.
/// The concatenation order is part of the wire contract: changing it
/// invalidates every signature already handed out.
#[derive(Clone)]
pub struct SignatureCodec {
    key: Vec<u8>,
}

impl SignatureCodec {
    /// Create a codec keyed with `secret`, or with [`SHARED_SECRET`] when the
    /// secret is absent or empty.
    pub fn new(secret: Option<&str>) -> Self {
        let key = match secret {
            Some(secret) if !secret.is_empty() => secret,
            _ => SHARED_SECRET,
        };
        Self {
            key: key.as_bytes().to_vec(),
        }
    }

    fn mac(&self, request_string: &str, client_id: &str) -> TollgateResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|_| TollgateError::SignatureComputation)?;
        mac.update(request_string.as_bytes());
        mac.update(client_id.as_bytes());
        Ok(mac)
    }

    /// Compute the signature binding `request_string` to `client_id`.
    pub fn sign(&self, request_string: &str, client_id: &str) -> TollgateResult<String> {
        let mac = self.mac(request_string, client_id)?;
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }

    /// Returns `true` if `signature` is the signature of `request_string` for
    /// `client_id`. The comparison runs in constant time; malformed input and
    /// MAC failures verify as `false`.
    pub fn verify(&self, request_string: &str, signature: &str, client_id: &str) -> bool {
        let Ok(received) = STANDARD.decode(signature.trim()) else {
            return false;
        };
        match self.mac(request_string, client_id) {
            Ok(mac) => mac.verify_slice(&received).is_ok(),
            Err(_) => false,
        }
    }
}

impl std::fmt::Debug for SignatureCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureCodec")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Sign with a one-off codec. See [`SignatureCodec::sign`].
pub fn sign(
    request_string: &str,
    client_id: &str,
    secret_key: Option<&str>,
) -> TollgateResult<String> {
    SignatureCodec::new(secret_key).sign(request_string, client_id)
}

/// Verify with a one-off codec. See [`SignatureCodec::verify`].
pub fn verify(
    request_string: &str,
    signature: &str,
    client_id: &str,
    secret_key: Option<&str>,
) -> bool {
    SignatureCodec::new(secret_key).verify(request_string, signature, client_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::distributions::Alphanumeric;
    use rand::Rng;

    fn random_string(len: usize) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect()
    }

    #[test]
    fn sign_then_verify_round_trips() {
        for _ in 0..50 {
            let request = format!("GET /{}", random_string(12));
            let id = random_string(8);
            let key = random_string(24);

            let signature = sign(&request, &id, Some(&key)).unwrap();
            assert!(verify(&request, &signature, &id, Some(&key)));
        }
    }

    #[test]
    fn changing_any_input_fails_verification() {
        let codec = SignatureCodec::new(Some("deployment-key"));
        let signature = codec.sign("GET /user", "10.0.0.1").unwrap();

        assert!(codec.verify("GET /user", &signature, "10.0.0.1"));
        assert!(!codec.verify("GET /admin", &signature, "10.0.0.1"));
        assert!(!codec.verify("GET /user", &signature, "10.0.0.2"));

        let other_key = SignatureCodec::new(Some("other-key"));
        assert!(!other_key.verify("GET /user", &signature, "10.0.0.1"));
    }

    #[test]
    fn signature_is_base64_of_a_sha256_mac() {
        let signature = sign("GET /", "client", None).unwrap();
        let raw = STANDARD.decode(&signature).unwrap();
        assert_eq!(raw.len(), 32);
    }

    #[test]
    fn known_vector() {
        // HMAC-SHA256("key", "The quick brown fox jumps over the lazy dog")
        let signature =
            sign("The quick brown fox ", "jumps over the lazy dog", Some("key")).unwrap();
        assert_eq!(signature, "97yD9DBThCSxMpjmqm+xQ+9NWaFJRhdZl0edvC0aPNg=");
    }

    #[test]
    fn empty_secret_falls_back_to_shared_secret() {
        let explicit = sign("GET /", "c", Some(SHARED_SECRET)).unwrap();
        assert_eq!(sign("GET /", "c", Some("")).unwrap(), explicit);
        assert_eq!(sign("GET /", "c", None).unwrap(), explicit);
    }

    #[test]
    fn malformed_signatures_do_not_verify() {
        let codec = SignatureCodec::new(None);
        assert!(!codec.verify("GET /", "", "c"));
        assert!(!codec.verify("GET /", "not base64 at all!", "c"));
        assert!(!codec.verify("GET /", "AAAA", "c"));
    }

    #[test]
    fn debug_output_redacts_key() {
        let codec = SignatureCodec::new(Some("super-secret-value"));
        let debug = format!("{:?}", codec);
        assert!(!debug.contains("super-secret-value"));
        assert!(debug.contains("REDACTED"));
    }
}
