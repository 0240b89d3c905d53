use crate::authz::AuthoritySet;
use crate::errors::ClaimstoneError;
use crate::settings::Keys;
use base64ct::Encoding;
use josekit::jwk::Jwk;
use josekit::jws::{JwsHeader, RS256};
use josekit::jwt;
use josekit::jwt::JwtPayload;
use rand::RngCore;
use serde_json::{json, Value};
use std::fs;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

#[derive(Clone)]
pub struct JwksManager {
    public_jwks_value: Arc<Value>,
    private_jwk: Arc<Jwk>,
    public_jwk: Arc<Jwk>,
}

/// Verified claims of one presented access token.
#[derive(Debug, Clone)]
pub struct VerifiedToken {
    pub subject: String,
    pub username: Option<String>,
    pub authorities: AuthoritySet,
}

impl JwksManager {
    pub async fn new(cfg: Keys) -> Result<Self, ClaimstoneError> {
        // Ensure parent dirs exist
        if let Some(parent) = cfg.jwks_path.parent() {
            fs::create_dir_all(parent)?;
        }
        if let Some(parent) = cfg.private_key_path.parent() {
            fs::create_dir_all(parent)?;
        }

        // If private key exists, load it; otherwise generate and persist both
        // private and public
        let private_jwk = if cfg.private_key_path.exists() {
            let s = fs::read_to_string(&cfg.private_key_path)?;
            // Stored as JSON
            serde_json::from_str::<Jwk>(&s)?
        } else {
            let mut jwk = Jwk::generate_rsa_key(2048)?;
            let kid = cfg.key_id.clone().unwrap_or_else(random_kid);
            jwk.set_key_id(&kid);
            jwk.set_algorithm(cfg.alg.as_str());
            jwk.set_key_use("sig");
            let priv_json = serde_json::to_string_pretty(&jwk)?;
            fs::write(&cfg.private_key_path, priv_json)?;
            jwk
        };

        let public_jwk = private_jwk.to_public_key()?;

        // Ensure JWKS file exists or update from private_jwk
        if !cfg.jwks_path.exists() {
            let jwk_val: Value = serde_json::to_value(&public_jwk)?;
            let jwks = json!({ "keys": [jwk_val] });
            fs::write(&cfg.jwks_path, serde_json::to_string_pretty(&jwks)?)?;
        }

        let public_jwks_value: Value = serde_json::from_str(&fs::read_to_string(&cfg.jwks_path)?)?;

        Ok(Self {
            public_jwks_value: Arc::new(public_jwks_value),
            private_jwk: Arc::new(private_jwk),
            public_jwk: Arc::new(public_jwk),
        })
    }

    pub fn jwks_json(&self) -> Value {
        (*self.public_jwks_value).clone()
    }

    /// Sign an access token carrying the materialized authority claims.
    /// The `authorities` claim is the snapshot taken at issuance and is never
    /// refreshed from the database during the token's lifetime.
    pub fn issue_access_token(
        &self,
        issuer: &str,
        subject: &str,
        username: &str,
        authorities: &AuthoritySet,
        ttl_secs: i64,
    ) -> Result<String, ClaimstoneError> {
        let now = SystemTime::now();
        let expires = now + Duration::from_secs(ttl_secs.max(0) as u64);

        let mut payload = JwtPayload::new();
        payload.set_issuer(issuer);
        payload.set_subject(subject);
        payload.set_issued_at(&now);
        payload.set_expires_at(&expires);
        payload
            .set_claim("username", Some(json!(username)))
            .map_err(|e| ClaimstoneError::Jose(e.to_string()))?;
        payload
            .set_claim("authorities", Some(json!(authorities.to_claims())))
            .map_err(|e| ClaimstoneError::Jose(e.to_string()))?;

        let signer = RS256.signer_from_jwk(&self.private_jwk)?;
        let mut header = JwsHeader::new();
        if let Some(kid) = self.private_jwk.key_id() {
            header.set_key_id(kid);
        }
        header.set_algorithm("RS256");
        let token = jwt::encode_with_signer(&payload, &header, &signer)?;
        Ok(token)
    }

    /// Verify signature and expiry, then rebuild the authority set from the
    /// claims. Any malformed authority token rejects the whole credential.
    pub fn verify_access_token(&self, token: &str) -> Result<VerifiedToken, ClaimstoneError> {
        let verifier = RS256.verifier_from_jwk(&self.public_jwk)?;
        let (payload, _header) = jwt::decode_with_verifier(token, &verifier)?;

        if let Some(expires_at) = payload.expires_at() {
            if expires_at <= SystemTime::now() {
                return Err(ClaimstoneError::Jose("token expired".to_string()));
            }
        } else {
            return Err(ClaimstoneError::Jose("token missing expiry".to_string()));
        }

        let subject = payload
            .subject()
            .ok_or_else(|| ClaimstoneError::Jose("token missing subject".to_string()))?
            .to_string();

        let username = payload
            .claim("username")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        let claim_tokens: Vec<String> = match payload.claim("authorities") {
            Some(Value::Array(values)) => values
                .iter()
                .map(|v| {
                    v.as_str().map(|s| s.to_string()).ok_or_else(|| {
                        ClaimstoneError::Jose("non-string authority claim".to_string())
                    })
                })
                .collect::<Result<_, _>>()?,
            _ => return Err(ClaimstoneError::Jose("token missing authorities".to_string())),
        };

        let authorities =
            AuthoritySet::from_claims(&claim_tokens).map_err(ClaimstoneError::Jose)?;

        Ok(VerifiedToken {
            subject,
            username,
            authorities,
        })
    }
}

fn random_kid() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64ct::Base64UrlUnpadded::encode_string(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::{materialize, RoleGrants};
    use tempfile::TempDir;

    async fn test_manager(dir: &TempDir) -> JwksManager {
        let cfg = Keys {
            jwks_path: dir.path().join("jwks.json"),
            key_id: None,
            alg: "RS256".to_string(),
            private_key_path: dir.path().join("private_key.json"),
        };
        JwksManager::new(cfg).await.expect("key setup")
    }

    fn reviewer_authorities() -> AuthoritySet {
        materialize(&[RoleGrants {
            role: "CLAIMS_REVIEWER".to_string(),
            permissions: vec!["CLAIMS_APPROVE".to_string()],
        }])
    }

    #[tokio::test]
    async fn test_sign_and_verify_round_trip() {
        let dir = TempDir::new().expect("temp dir");
        let mgr = test_manager(&dir).await;

        let token = mgr
            .issue_access_token(
                "http://localhost:8080",
                "17",
                "reviewer",
                &reviewer_authorities(),
                600,
            )
            .expect("sign token");

        let verified = mgr.verify_access_token(&token).expect("verify token");
        assert_eq!(verified.subject, "17");
        assert_eq!(verified.username.as_deref(), Some("reviewer"));
        assert!(verified.authorities.has_role("CLAIMS_REVIEWER"));
        assert!(verified.authorities.has_permission("CLAIMS_APPROVE"));
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let dir = TempDir::new().expect("temp dir");
        let mgr = test_manager(&dir).await;

        let token = mgr
            .issue_access_token(
                "http://localhost:8080",
                "17",
                "reviewer",
                &reviewer_authorities(),
                0,
            )
            .expect("sign token");

        assert!(mgr.verify_access_token(&token).is_err());
    }

    #[tokio::test]
    async fn test_garbage_token_rejected() {
        let dir = TempDir::new().expect("temp dir");
        let mgr = test_manager(&dir).await;
        assert!(mgr.verify_access_token("not.a.jwt").is_err());
    }

    #[tokio::test]
    async fn test_key_persists_across_restart() {
        let dir = TempDir::new().expect("temp dir");
        let first = test_manager(&dir).await;
        let token = first
            .issue_access_token("iss", "1", "admin", &reviewer_authorities(), 600)
            .expect("sign token");

        // Second manager loads the same persisted key and can verify.
        let second = test_manager(&dir).await;
        assert!(second.verify_access_token(&token).is_ok());
    }
}
