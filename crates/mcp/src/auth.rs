//! Bearer tokens, certificates and permission checks.
//!
//! Tokens are stateless: `base64url(claims JSON) "." base64url(HMAC-SHA256)`,
//! verified with the shared secret and the current time only. A manager
//! without a secret accepts certificates only and rejects every token.
//!
//! Certificates are Ed25519-signed identity documents wrapped in
//! `-----BEGIN SWITCHBOARD CERTIFICATE-----` armor. They are accepted when the
//! signature verifies against one of the configured trust anchors and the
//! current time falls inside the validity window.
//!
//! Permissions are plain strings (`tools:list`, `tools:call`, ...). `"*"`
//! grants everything; otherwise the match must be exact.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

use switchboard_core::{AuthConfig, ConfigError};

use crate::error::AuthError;

type HmacSha256 = Hmac<Sha256>;

const CERT_BEGIN: &str = "-----BEGIN SWITCHBOARD CERTIFICATE-----";
const CERT_END: &str = "-----END SWITCHBOARD CERTIFICATE-----";

/// Permission that grants every other permission.
pub const WILDCARD: &str = "*";

fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

/// `now + ttl` in unix seconds, clamped instead of wrapping.
fn expires_after(now: i64, ttl: Duration) -> i64 {
    now.saturating_add(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX))
}

fn grants(permissions: &[String], permission: &str) -> bool {
    permissions.iter().any(|p| p == WILDCARD || p == permission)
}

// ── Tokens ──────────────────────────────────────────────────────────

/// Claims carried by a bearer token. Times are unix seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub permissions: Vec<String>,
    pub iat: i64,
    pub exp: i64,
}

impl TokenClaims {
    pub fn grants(&self, permission: &str) -> bool {
        grants(&self.permissions, permission)
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.exp
    }

    /// Read the claims without checking the signature.
    ///
    /// For holders of a token who lack the secret (clients gating their own
    /// sends). Never use this to authorize anything.
    pub fn decode_unverified(token: &str) -> Result<Self, AuthError> {
        let (claims, _) = token
            .split_once('.')
            .ok_or_else(|| AuthError::InvalidCredential("malformed token".to_string()))?;
        Self::decode_part(claims)
    }

    fn decode_part(part: &str) -> Result<Self, AuthError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(part)
            .map_err(|_| AuthError::InvalidCredential("token is not base64url".to_string()))?;
        serde_json::from_slice(&bytes)
            .map_err(|_| AuthError::InvalidCredential("token claims are not valid JSON".to_string()))
    }
}

/// Outcome of [`AuthManager::validate_token`].
#[derive(Debug, Clone, PartialEq)]
pub struct TokenValidation {
    pub valid: bool,
    pub subject: Option<String>,
    pub permissions: Vec<String>,
    pub error: Option<AuthError>,
}

impl TokenValidation {
    fn accepted(claims: TokenClaims) -> Self {
        Self {
            valid: true,
            subject: Some(claims.sub),
            permissions: claims.permissions,
            error: None,
        }
    }

    fn rejected(error: AuthError) -> Self {
        Self {
            valid: false,
            subject: None,
            permissions: Vec::new(),
            error: Some(error),
        }
    }
}

// ── Credentials ─────────────────────────────────────────────────────

/// A credential as presented by a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Token(String),
    Certificate(String),
}

impl Credential {
    /// Parse an `Authorization` value: `Bearer <token>`,
    /// `Certificate <cert>`, or a bare token.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        let credential = match value.split_once(' ') {
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => {
                Credential::Token(rest.trim().to_string())
            }
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case("certificate") => {
                Credential::Certificate(rest.trim().to_string())
            }
            _ => Credential::Token(value.to_string()),
        };
        Some(credential)
    }

    /// Render back into `Authorization` form.
    pub fn to_header(&self) -> String {
        match self {
            Credential::Token(token) => format!("Bearer {token}"),
            Credential::Certificate(cert) => format!("Certificate {}", cert_body(cert)),
        }
    }
}

/// Who a verified credential belongs to and what it may do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub subject: String,
    pub permissions: Vec<String>,
}

impl Principal {
    pub fn grants(&self, permission: &str) -> bool {
        grants(&self.permissions, permission)
    }
}

// ── Certificates ────────────────────────────────────────────────────

/// The signed part of a certificate. Times are unix seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificateBody {
    pub subject: String,
    pub issuer: String,
    pub serial: u64,
    pub permissions: Vec<String>,
    pub not_before: i64,
    pub not_after: i64,
}

/// Wire envelope: the exact signed bytes plus the signature.
#[derive(Serialize, Deserialize)]
struct CertificateEnvelope {
    tbs: String,
    signature: String,
}

/// Base64 payload of a certificate, with or without armor.
fn cert_body(cert: &str) -> String {
    cert.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && *l != CERT_BEGIN && *l != CERT_END)
        .collect()
}

/// Issues certificates signed with an Ed25519 key.
pub struct CertificateAuthority {
    issuer: String,
    signing_key: SigningKey,
    next_serial: AtomicU64,
}

impl CertificateAuthority {
    pub fn new(issuer: impl Into<String>, signing_key: SigningKey) -> Self {
        Self {
            issuer: issuer.into(),
            signing_key,
            next_serial: AtomicU64::new(1),
        }
    }

    /// The key servers must list as a trust anchor.
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Trust-anchor file line for this issuer.
    pub fn trust_anchor_line(&self) -> String {
        STANDARD.encode(self.verifying_key().as_bytes())
    }

    /// Issue a certificate valid from now for `validity`.
    pub fn issue(&self, subject: &str, permissions: &[&str], validity: Duration) -> String {
        let now = now_secs();
        self.issue_window(subject, permissions, now, expires_after(now, validity))
    }

    /// Issue a certificate for an explicit validity window.
    pub fn issue_window(
        &self,
        subject: &str,
        permissions: &[&str],
        not_before: i64,
        not_after: i64,
    ) -> String {
        let body = CertificateBody {
            subject: subject.to_string(),
            issuer: self.issuer.clone(),
            serial: self.next_serial.fetch_add(1, Ordering::Relaxed),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
            not_before,
            not_after,
        };
        // Serializing a plain struct of strings and integers cannot fail.
        let tbs = serde_json::to_vec(&body).unwrap_or_default();
        let signature = self.signing_key.sign(&tbs);
        let envelope = CertificateEnvelope {
            tbs: STANDARD.encode(&tbs),
            signature: STANDARD.encode(signature.to_bytes()),
        };
        let encoded = STANDARD.encode(serde_json::to_vec(&envelope).unwrap_or_default());

        let mut pem = String::from(CERT_BEGIN);
        pem.push('\n');
        for chunk in encoded.as_bytes().chunks(64) {
            pem.push_str(&String::from_utf8_lossy(chunk));
            pem.push('\n');
        }
        pem.push_str(CERT_END);
        pem.push('\n');
        pem
    }
}

// ── Manager ─────────────────────────────────────────────────────────

/// Issues and checks credentials.
#[derive(Clone)]
pub struct AuthManager {
    mac: Option<HmacSha256>,
    default_ttl: Duration,
    trust_anchors: Vec<VerifyingKey>,
}

impl AuthManager {
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, ConfigError> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(ConfigError::Invalid("auth.token_secret must not be empty".into()));
        }
        let mac = HmacSha256::new_from_slice(secret)
            .map_err(|e| ConfigError::Invalid(format!("unusable token secret: {e}")))?;
        Ok(Self {
            mac: Some(mac),
            ..Self::certificates_only()
        })
    }

    /// A manager with no token secret. Only certificates from its trust
    /// anchors are accepted.
    pub fn certificates_only() -> Self {
        Self {
            mac: None,
            default_ttl: Duration::from_secs(3600),
            trust_anchors: Vec::new(),
        }
    }

    /// Build from config. `Ok(None)` when neither a token secret nor a
    /// trust-anchor file is configured.
    pub fn from_config(config: &AuthConfig) -> Result<Option<Self>, ConfigError> {
        if !config.is_enabled() {
            return Ok(None);
        }
        let manager = match config.token_secret.as_deref() {
            Some(secret) => Self::new(secret)?,
            None => Self::certificates_only(),
        };
        let mut manager = manager.with_default_ttl(config.token_expiry());
        if let Some(path) = &config.certificate_path {
            manager.trust_anchors = load_trust_anchors(path)?;
            info!(path = %path.display(), anchors = manager.trust_anchors.len(), "loaded trust anchors");
        }
        Ok(Some(manager))
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_trust_anchor(mut self, key: VerifyingKey) -> Self {
        self.trust_anchors.push(key);
        self
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn signature(&self, payload: &str) -> Result<HmacSha256, AuthError> {
        let mut mac = self
            .mac
            .clone()
            .ok_or_else(|| AuthError::InvalidCredential("token auth is not configured".to_string()))?;
        mac.update(payload.as_bytes());
        Ok(mac)
    }

    /// Issue a token for `subject` expiring `ttl` from now. Fails when the
    /// manager has no token secret.
    pub fn generate_token(
        &self,
        subject: &str,
        permissions: &[&str],
        ttl: Duration,
    ) -> Result<String, AuthError> {
        let now = now_secs();
        self.generate_token_at(subject, permissions, now, expires_after(now, ttl))
    }

    fn generate_token_at(
        &self,
        subject: &str,
        permissions: &[&str],
        iat: i64,
        exp: i64,
    ) -> Result<String, AuthError> {
        let claims = TokenClaims {
            sub: subject.to_string(),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
            iat,
            exp,
        };
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap_or_default());
        let tag = self.signature(&payload)?.finalize().into_bytes();
        Ok(format!("{payload}.{}", URL_SAFE_NO_PAD.encode(tag)))
    }

    pub fn validate_token(&self, token: &str) -> TokenValidation {
        self.validate_token_at(token, now_secs())
    }

    /// Validate `token` as of `now` (unix seconds).
    pub fn validate_token_at(&self, token: &str, now: i64) -> TokenValidation {
        match self.verify_token(token, now) {
            Ok(claims) => TokenValidation::accepted(claims),
            Err(e) => TokenValidation::rejected(e),
        }
    }

    fn verify_token(&self, token: &str, now: i64) -> Result<TokenClaims, AuthError> {
        let (payload, tag) = token
            .split_once('.')
            .ok_or_else(|| AuthError::InvalidCredential("malformed token".to_string()))?;
        let tag = URL_SAFE_NO_PAD
            .decode(tag)
            .map_err(|_| AuthError::InvalidCredential("malformed token signature".to_string()))?;
        self.signature(payload)?
            .verify_slice(&tag)
            .map_err(|_| AuthError::InvalidCredential("bad token signature".to_string()))?;

        let claims = TokenClaims::decode_part(payload)?;
        if claims.is_expired_at(now) {
            return Err(AuthError::Expired);
        }
        Ok(claims)
    }

    /// Whether `token` is currently valid and grants `permission`.
    pub fn check_permission(&self, token: &str, permission: &str) -> bool {
        self.verify_token(token, now_secs())
            .map(|claims| claims.grants(permission))
            .unwrap_or(false)
    }

    pub fn validate_certificate(&self, cert: &str) -> Result<Principal, AuthError> {
        self.validate_certificate_at(cert, now_secs())
    }

    /// Check signature, issuer trust and validity window as of `now`.
    pub fn validate_certificate_at(&self, cert: &str, now: i64) -> Result<Principal, AuthError> {
        let invalid = |msg: &str| AuthError::InvalidCredential(msg.to_string());

        let envelope = STANDARD
            .decode(cert_body(cert))
            .map_err(|_| invalid("certificate is not base64"))?;
        let envelope: CertificateEnvelope =
            serde_json::from_slice(&envelope).map_err(|_| invalid("malformed certificate"))?;
        let tbs = STANDARD
            .decode(&envelope.tbs)
            .map_err(|_| invalid("malformed certificate body"))?;
        let signature: [u8; 64] = STANDARD
            .decode(&envelope.signature)
            .ok()
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or_else(|| invalid("malformed certificate signature"))?;
        let signature = Signature::from_bytes(&signature);

        if !self
            .trust_anchors
            .iter()
            .any(|anchor| anchor.verify(&tbs, &signature).is_ok())
        {
            return Err(invalid("certificate is not signed by a trusted issuer"));
        }

        let body: CertificateBody =
            serde_json::from_slice(&tbs).map_err(|_| invalid("malformed certificate body"))?;
        if now < body.not_before {
            return Err(invalid("certificate is not yet valid"));
        }
        if now >= body.not_after {
            return Err(AuthError::Expired);
        }
        debug!(subject = %body.subject, serial = body.serial, "certificate accepted");

        Ok(Principal {
            subject: body.subject,
            permissions: body.permissions,
        })
    }

    /// Verify `credential` and require it to grant `permission`.
    pub fn authorize(&self, credential: &Credential, permission: &str) -> Result<Principal, AuthError> {
        let principal = match credential {
            Credential::Token(token) => {
                let claims = self.verify_token(token, now_secs())?;
                Principal {
                    subject: claims.sub,
                    permissions: claims.permissions,
                }
            }
            Credential::Certificate(cert) => self.validate_certificate(cert)?,
        };
        if principal.grants(permission) {
            Ok(principal)
        } else {
            Err(AuthError::PermissionDenied(format!(
                "'{}' lacks '{permission}'",
                principal.subject
            )))
        }
    }
}

/// One base64 Ed25519 verifying key per line; blank lines and `#` comments
/// are skipped.
fn load_trust_anchors(path: &Path) -> Result<Vec<VerifyingKey>, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    content
        .lines()
        .map(str::trim)
        .enumerate()
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(n, line)| {
            let bad = || ConfigError::Invalid(format!("{}:{}: not an Ed25519 key", path.display(), n + 1));
            let bytes: [u8; 32] = STANDARD
                .decode(line)
                .ok()
                .and_then(|b| b.try_into().ok())
                .ok_or_else(bad)?;
            VerifyingKey::from_bytes(&bytes).map_err(|_| bad())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn manager() -> AuthManager {
        AuthManager::new("test-secret").unwrap()
    }

    fn authority() -> CertificateAuthority {
        CertificateAuthority::new("switchboard-test-ca", SigningKey::from_bytes(&[7u8; 32]))
    }

    #[test]
    fn test_exact_permission_match() {
        let auth = manager();
        let token = auth
            .generate_token("agent-1", &["tools:list"], Duration::from_secs(60))
            .unwrap();
        assert!(auth.check_permission(&token, "tools:list"));
        assert!(!auth.check_permission(&token, "tools:call"));
    }

    #[test]
    fn test_wildcard_grants_everything() {
        let auth = manager();
        let token = auth.generate_token("admin", &["*"], Duration::from_secs(60)).unwrap();
        assert!(auth.check_permission(&token, "tools:list"));
        assert!(auth.check_permission(&token, "tools:call"));
    }

    #[test]
    fn test_validate_token_reports_claims() {
        let auth = manager();
        let token = auth
            .generate_token("agent-1", &["tools:list", "prompts:get"], Duration::from_secs(60))
            .unwrap();
        let result = auth.validate_token(&token);
        assert!(result.valid);
        assert_eq!(result.subject.as_deref(), Some("agent-1"));
        assert_eq!(result.permissions, vec!["tools:list", "prompts:get"]);
        assert_eq!(result.error, None);
    }

    #[test]
    fn test_expired_token_is_expired_not_invalid() {
        let auth = manager();
        let token = auth.generate_token_at("agent-1", &["*"], 1_000, 1_060).unwrap();

        assert!(auth.validate_token_at(&token, 1_059).valid);

        let result = auth.validate_token_at(&token, 1_060);
        assert!(!result.valid);
        assert_eq!(result.error, Some(AuthError::Expired));
        assert_eq!(result.error.unwrap().reason(), "token_expired");
    }

    #[test]
    fn test_tampered_or_foreign_tokens_are_invalid() {
        let auth = manager();
        let token = auth
            .generate_token("agent-1", &["tools:list"], Duration::from_secs(60))
            .unwrap();

        let forged_claims = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&serde_json::json!({
                "sub": "agent-1", "permissions": ["*"], "iat": 0, "exp": i64::MAX
            }))
            .unwrap(),
        );
        let (_, tag) = token.split_once('.').unwrap();
        let forged = format!("{forged_claims}.{tag}");

        let other = AuthManager::new("other-secret").unwrap();
        let foreign = other.generate_token("agent-1", &["*"], Duration::from_secs(60)).unwrap();

        for bad in [forged.as_str(), foreign.as_str(), "garbage", "a.b", ""] {
            let result = auth.validate_token(bad);
            assert!(!result.valid, "{bad}");
            assert_eq!(result.error.unwrap().reason(), "invalid_credential", "{bad}");
        }
    }

    #[test]
    fn test_decode_unverified_reads_claims() {
        let auth = manager();
        let token = auth
            .generate_token("agent-1", &["tools:call"], Duration::from_secs(60))
            .unwrap();
        let claims = TokenClaims::decode_unverified(&token).unwrap();
        assert_eq!(claims.sub, "agent-1");
        assert!(claims.grants("tools:call"));
        assert!(!claims.grants("tools:list"));
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(AuthManager::new("").is_err());
    }

    #[test]
    fn test_certificate_from_trusted_issuer() {
        let ca = authority();
        let auth = manager().with_trust_anchor(ca.verifying_key());
        let cert = ca.issue("worker-7", &["tools:call"], Duration::from_secs(3600));
        assert!(cert.starts_with(CERT_BEGIN));

        let principal = auth.validate_certificate(&cert).unwrap();
        assert_eq!(principal.subject, "worker-7");
        assert!(principal.grants("tools:call"));

        // Header form drops the armor.
        let header = Credential::Certificate(cert).to_header();
        let parsed = Credential::parse(&header).unwrap();
        assert!(auth.authorize(&parsed, "tools:call").is_ok());
        assert_eq!(
            auth.authorize(&parsed, "tools:list").unwrap_err().reason(),
            "permission_denied"
        );
    }

    #[test]
    fn test_certificate_from_untrusted_issuer_rejected() {
        let rogue = CertificateAuthority::new("rogue", SigningKey::from_bytes(&[9u8; 32]));
        let auth = manager().with_trust_anchor(authority().verifying_key());
        let cert = rogue.issue("worker-7", &["*"], Duration::from_secs(3600));
        assert!(matches!(
            auth.validate_certificate(&cert),
            Err(AuthError::InvalidCredential(_))
        ));
    }

    #[test]
    fn test_certificate_validity_window() {
        let ca = authority();
        let auth = manager().with_trust_anchor(ca.verifying_key());
        let cert = ca.issue_window("worker-7", &["*"], 1_000, 2_000);

        assert!(matches!(
            auth.validate_certificate_at(&cert, 999),
            Err(AuthError::InvalidCredential(_))
        ));
        assert!(auth.validate_certificate_at(&cert, 1_500).is_ok());
        assert_eq!(auth.validate_certificate_at(&cert, 2_000), Err(AuthError::Expired));
    }

    #[test]
    fn test_credential_parsing() {
        assert_eq!(Credential::parse("Bearer abc"), Some(Credential::Token("abc".into())));
        assert_eq!(Credential::parse("bearer abc"), Some(Credential::Token("abc".into())));
        assert_eq!(Credential::parse("abc"), Some(Credential::Token("abc".into())));
        assert_eq!(Credential::parse("Certificate xyz"), Some(Credential::Certificate("xyz".into())));
        assert_eq!(Credential::parse("  "), None);
    }

    #[test]
    fn test_from_config_loads_trust_anchors() {
        let ca = authority();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# switchboard trust anchors").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "{}", ca.trust_anchor_line()).unwrap();

        let config = AuthConfig {
            token_secret: Some("s3cret".into()),
            certificate_path: Some(file.path().to_path_buf()),
            ..AuthConfig::default()
        };
        let auth = AuthManager::from_config(&config).unwrap().unwrap();
        let cert = ca.issue("worker-1", &["tools:list"], Duration::from_secs(60));
        assert!(auth.validate_certificate(&cert).is_ok());
    }

    #[test]
    fn test_from_config_disabled_without_secret_or_anchors() {
        assert!(AuthManager::from_config(&AuthConfig::default()).unwrap().is_none());
    }

    #[test]
    fn test_from_config_with_anchors_only() {
        let ca = authority();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", ca.trust_anchor_line()).unwrap();

        let config = AuthConfig {
            certificate_path: Some(file.path().to_path_buf()),
            ..AuthConfig::default()
        };
        assert!(config.is_enabled());
        let auth = AuthManager::from_config(&config).unwrap().unwrap();

        let cert = ca.issue("worker-1", &["tools:list"], Duration::from_secs(60));
        let parsed = Credential::Certificate(cert);
        assert!(auth.authorize(&parsed, "tools:list").is_ok());

        let foreign = manager()
            .generate_token("agent-1", &["*"], Duration::from_secs(60))
            .unwrap();
        let result = auth.validate_token(&foreign);
        assert!(!result.valid);
        assert_eq!(result.error.unwrap().reason(), "invalid_credential");
        assert!(!auth.check_permission(&foreign, "tools:list"));
        assert_eq!(
            auth.authorize(&Credential::Token(foreign), "tools:list")
                .unwrap_err()
                .reason(),
            "invalid_credential"
        );
        assert!(auth
            .generate_token("agent-1", &["*"], Duration::from_secs(60))
            .is_err());
    }

    #[test]
    fn test_huge_ttl_saturates_instead_of_wrapping() {
        let auth = manager();
        let token = auth
            .generate_token("agent-1", &["*"], Duration::from_secs(u64::MAX))
            .unwrap();
        let result = auth.validate_token(&token);
        assert!(result.valid);
        assert_eq!(TokenClaims::decode_unverified(&token).unwrap().exp, i64::MAX);

        let ca = authority();
        let auth = auth.with_trust_anchor(ca.verifying_key());
        let cert = ca.issue("worker-1", &["*"], Duration::MAX);
        assert!(auth.validate_certificate(&cert).is_ok());
    }

    #[test]
    fn test_bad_trust_anchor_line_reports_location() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not-a-key").unwrap();
        let config = AuthConfig {
            token_secret: Some("s3cret".into()),
            certificate_path: Some(file.path().to_path_buf()),
            ..AuthConfig::default()
        };
        let err = AuthManager::from_config(&config).err().unwrap();
        assert!(err.to_string().contains(":1:"));
    }
}
