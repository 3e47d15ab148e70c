use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// Validates `X-Twilio-Signature` headers on webhook requests.
///
/// The signed payload is the full public URL followed by every POST
/// parameter, sorted by name, appended as `namevalue` with no separators.
pub struct SignatureValidator {
    key: Vec<u8>,
}

impl SignatureValidator {
    pub fn new(auth_token: &str) -> Self {
        Self { key: auth_token.as_bytes().to_vec() }
    }

    pub fn is_valid(&self, url: &str, params: &[(String, String)], signature: &str) -> bool {
        let Ok(provided) = BASE64.decode(signature.trim()) else {
            return false;
        };

        let mut sorted: Vec<&(String, String)> = params.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));

        let mut payload = String::from(url);
        for (name, value) in sorted {
            payload.push_str(name);
            payload.push_str(value);
        }

        let Ok(mut mac) = HmacSha1::new_from_slice(&self.key) else {
            return false;
        };
        mac.update(payload.as_bytes());
        mac.verify_slice(&provided).is_ok()
    }
}
