use super::{AuthContext, AuthHandler, AuthRejection};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use serde_json::Value;
use tracing::debug;

/// Bearer token handler for tokens of the form `header.payload.signature`.
///
/// The signature part must equal the configured `signature` string. The
/// payload is base64url (or standard base64) JSON; its claims become the
/// auth context, with `sub` copied to `userId`. An `exp` claim in the past
/// rejects the token.
///
/// This is a shared-secret check, not cryptographic JWT verification.
pub struct BearerJwtAuth {
    signature: String,
    now: fn() -> u64,
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl BearerJwtAuth {
    pub fn new(signature: impl Into<String>) -> Self {
        Self {
            signature: signature.into(),
            now: unix_now,
        }
    }

    #[cfg(test)]
    fn with_clock(mut self, now: fn() -> u64) -> Self {
        self.now = now;
        self
    }

    fn decode_payload(payload: &str) -> Option<Value> {
        let bytes = general_purpose::URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .or_else(|_| general_purpose::STANDARD.decode(payload))
            .ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    fn validate_token(&self, token: &str) -> Result<AuthContext, AuthRejection> {
        let mut parts = token.split('.');
        let (Some(_header), Some(payload), Some(sig), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            debug!("Bearer token rejected: malformed token");
            return Err(AuthRejection::Invalid("malformed token".into()));
        };
        if sig != self.signature {
            debug!("Bearer token rejected: signature mismatch");
            return Err(AuthRejection::Invalid("invalid signature".into()));
        }
        let Some(Value::Object(mut claims)) = Self::decode_payload(payload) else {
            debug!("Bearer token rejected: payload is not a JSON object");
            return Err(AuthRejection::Invalid("invalid payload".into()));
        };
        if let Some(exp) = claims.get("exp").and_then(Value::as_u64) {
            if exp <= (self.now)() {
                debug!(exp, "Bearer token rejected: expired");
                return Err(AuthRejection::Invalid("token expired".into()));
            }
        }
        if let Some(sub) = claims.get("sub").cloned() {
            claims.entry("userId").or_insert(sub);
        }
        Ok(AuthContext::from_map(claims))
    }
}

#[async_trait]
impl AuthHandler for BearerJwtAuth {
    async fn authenticate(&self, credential: Option<&str>) -> Result<AuthContext, AuthRejection> {
        let credential = credential.ok_or(AuthRejection::MissingCredential)?;
        let token = credential
            .strip_prefix("Bearer ")
            .or_else(|| credential.strip_prefix("bearer "))
            .unwrap_or(credential)
            .trim();
        self.validate_token(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn token(claims: Value, sig: &str) -> String {
        let payload = general_purpose::URL_SAFE_NO_PAD.encode(claims.to_string());
        format!("eyJhbGciOiJub25lIn0.{payload}.{sig}")
    }

    #[tokio::test]
    async fn accepts_matching_signature_and_maps_sub() {
        let auth = BearerJwtAuth::new("sig");
        let t = token(json!({"sub": "user-1", "scope": "read"}), "sig");
        let ctx = auth
            .authenticate(Some(&format!("Bearer {t}")))
            .await
            .unwrap();
        assert_eq!(ctx.user_id(), Some("user-1"));
        assert_eq!(ctx.get("scope"), Some(&json!("read")));
    }

    #[tokio::test]
    async fn rejects_wrong_signature_and_garbage() {
        let auth = BearerJwtAuth::new("sig");
        let t = token(json!({"sub": "u"}), "other");
        assert!(auth.authenticate(Some(&t)).await.is_err());
        assert!(auth.authenticate(Some("Bearer a.b")).await.is_err());
        assert!(auth.authenticate(Some("Bearer a.!!!.sig")).await.is_err());
        assert_eq!(
            auth.authenticate(None).await.unwrap_err(),
            AuthRejection::MissingCredential
        );
    }

    #[tokio::test]
    async fn rejects_expired_tokens() {
        let auth = BearerJwtAuth::new("sig").with_clock(|| 1_000);
        let expired = token(json!({"sub": "u", "exp": 999}), "sig");
        let fresh = token(json!({"sub": "u", "exp": 1_001}), "sig");
        assert!(auth.authenticate(Some(&expired)).await.is_err());
        assert!(auth.authenticate(Some(&fresh)).await.is_ok());
    }
}
