//! Self-verifying access tokens for delegated card links.
//!
//! Wire format: `base64url(subject:email:issued_at)` + `:` + `hex(hmac_sha256(secret, payload))`.
//! The HMAC is computed over the *encoded* payload, so the signature is checked before any
//! payload byte is decoded or trusted.

use std::borrow::Cow;

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::debug;
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_DELIMITER: char = ':';
const PAYLOAD_FIELDS: usize = 3;

/// Tokens older than this are rejected.
pub const TOKEN_VALIDITY_DAYS: i64 = 30;

// Padded on output; older links were minted with padding and some clients strip it.
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Errors produced while issuing or verifying tokens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("{0} is required")]
    Validation(&'static str),
    #[error("token is not of the form <payload>:<signature>")]
    MalformedToken,
    #[error("token signature mismatch")]
    SignatureMismatch,
    #[error("malformed token payload: {0}")]
    MalformedPayload(String),
    #[error("invalid token timestamp: {0}")]
    InvalidTimestamp(String),
    #[error("token expired")]
    TokenExpired,
}

impl TokenError {
    pub fn is_expired(&self) -> bool {
        matches!(self, TokenError::TokenExpired)
    }

    /// True for failures that mean the token was tampered with or never valid.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            TokenError::MalformedToken
                | TokenError::SignatureMismatch
                | TokenError::MalformedPayload(_)
                | TokenError::InvalidTimestamp(_)
        )
    }
}

/// Shared HMAC key used to sign and verify tokens.
#[derive(Clone)]
pub struct TokenSecret(Zeroizing<Vec<u8>>);

impl TokenSecret {
    pub fn new(value: impl Into<String>) -> Result<Self, TokenError> {
        let value = value.into();
        if value.is_empty() {
            return Err(TokenError::Validation("secret"));
        }
        Ok(Self(Zeroizing::new(value.into_bytes())))
    }

    fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for TokenSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSecret")
            .field("bytes", &"***redacted***")
            .finish()
    }
}

/// Verified contents of a token. Only produced by a successful verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenClaims {
    subject_id: String,
    email: String,
    issued_at: DateTime<Utc>,
}

impl TokenClaims {
    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }
}

pub fn token_validity() -> Duration {
    Duration::days(TOKEN_VALIDITY_DAYS)
}

/// Signing key plus validity window, held as long-lived service state.
#[derive(Debug, Clone)]
pub struct TokenCodec {
    secret: TokenSecret,
    validity: Duration,
}

impl TokenCodec {
    pub fn new(secret: TokenSecret) -> Self {
        Self {
            secret,
            validity: token_validity(),
        }
    }

    pub fn with_validity(mut self, validity: Duration) -> Self {
        self.validity = validity;
        self
    }

    /// Last instant at which `claims` still verify under this codec's window.
    pub fn expires_at(&self, claims: &TokenClaims) -> DateTime<Utc> {
        claims.issued_at + self.validity
    }

    pub fn issue(&self, subject_id: &str, email: &str) -> Result<String, TokenError> {
        self.issue_at(subject_id, email, Utc::now())
    }

    pub fn issue_at(
        &self,
        subject_id: &str,
        email: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        require("subject_id", subject_id)?;
        require("email", email)?;

        let encoded_payload = encode_payload(subject_id, email, issued_at);
        let signature = sign(self.secret.as_bytes(), &encoded_payload);
        Ok(format!("{encoded_payload}{TOKEN_DELIMITER}{signature}"))
    }

    pub fn verify(&self, token: &str) -> Result<TokenClaims, TokenError> {
        self.verify_at(token, Utc::now())
    }

    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims, TokenError> {
        verify_with_key(token, self.secret.as_bytes(), self.validity, now)
    }
}

/// Issue a token for `subject_id`/`email` signed with `secret`.
pub fn issue_token(subject_id: &str, email: &str, secret: &str) -> Result<String, TokenError> {
    issue_token_at(subject_id, email, secret, Utc::now())
}

pub fn issue_token_at(
    subject_id: &str,
    email: &str,
    secret: &str,
    issued_at: DateTime<Utc>,
) -> Result<String, TokenError> {
    require("subject_id", subject_id)?;
    require("email", email)?;
    let secret = TokenSecret::new(secret)?;
    TokenCodec::new(secret).issue_at(subject_id, email, issued_at)
}

/// Verify `token` against `secret` using the standard validity window.
pub fn verify_token(token: &str, secret: &str) -> Result<TokenClaims, TokenError> {
    verify_token_at(token, secret, Utc::now())
}

pub fn verify_token_at(
    token: &str,
    secret: &str,
    now: DateTime<Utc>,
) -> Result<TokenClaims, TokenError> {
    verify_with_key(token, secret.as_bytes(), token_validity(), now)
}

fn require(field: &'static str, value: &str) -> Result<(), TokenError> {
    if value.is_empty() {
        Err(TokenError::Validation(field))
    } else {
        Ok(())
    }
}

fn encode_payload(subject_id: &str, email: &str, issued_at: DateTime<Utc>) -> String {
    let payload = format!(
        "{}{TOKEN_DELIMITER}{}{TOKEN_DELIMITER}{}",
        escape_field(subject_id),
        escape_field(email),
        issued_at.to_rfc3339_opts(SecondsFormat::Secs, true),
    );
    PAYLOAD_ENGINE.encode(payload.as_bytes())
}

fn sign(key: &[u8], encoded_payload: &str) -> String {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(encoded_payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn split_token(token: &str) -> Result<(&str, &str), TokenError> {
    let mut parts = token.split(TOKEN_DELIMITER);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(payload), Some(signature), None) if !payload.is_empty() && !signature.is_empty() => {
            Ok((payload, signature))
        }
        _ => Err(TokenError::MalformedToken),
    }
}

// Order matters: split, signature, decode, field count, timestamp, expiry.
fn verify_with_key(
    token: &str,
    key: &[u8],
    validity: Duration,
    now: DateTime<Utc>,
) -> Result<TokenClaims, TokenError> {
    let (encoded_payload, provided_signature) = split_token(token)?;

    let expected_signature = sign(key, encoded_payload);
    let eq = ConstantTimeEq::ct_eq(expected_signature.as_bytes(), provided_signature.as_bytes())
        .unwrap_u8();
    if eq != 1 {
        return Err(TokenError::SignatureMismatch);
    }

    let payload_bytes = PAYLOAD_ENGINE
        .decode(encoded_payload)
        .map_err(|err| TokenError::MalformedPayload(format!("base64 decode failed: {err}")))?;
    let payload = String::from_utf8(payload_bytes)
        .map_err(|_| TokenError::MalformedPayload("payload is not valid UTF-8".to_string()))?;

    let fields: Vec<&str> = payload.splitn(PAYLOAD_FIELDS, TOKEN_DELIMITER).collect();
    let [raw_subject, raw_email, raw_timestamp] = fields.as_slice() else {
        return Err(TokenError::MalformedPayload(format!(
            "expected {PAYLOAD_FIELDS} fields, found {}",
            fields.len()
        )));
    };

    let subject_id = unescape_field(raw_subject)?;
    let email = unescape_field(raw_email)?;
    if subject_id.is_empty() || email.is_empty() {
        return Err(TokenError::MalformedPayload(
            "subject and email must be non-empty".to_string(),
        ));
    }

    let issued_at = DateTime::parse_from_rfc3339(raw_timestamp)
        .map_err(|err| TokenError::InvalidTimestamp(err.to_string()))?
        .with_timezone(&Utc);

    if now.signed_duration_since(issued_at) > validity {
        return Err(TokenError::TokenExpired);
    }

    debug!(subject_id = %subject_id, "verified access token");
    Ok(TokenClaims {
        subject_id,
        email,
        issued_at,
    })
}

fn escape_field(value: &str) -> Cow<'_, str> {
    if !value.contains(|ch: char| ch == '%' || ch == TOKEN_DELIMITER) {
        return Cow::Borrowed(value);
    }
    let mut escaped = String::with_capacity(value.len() + 8);
    for ch in value.chars() {
        match ch {
            '%' => escaped.push_str("%25"),
            TOKEN_DELIMITER => escaped.push_str("%3A"),
            other => escaped.push(other),
        }
    }
    Cow::Owned(escaped)
}

fn unescape_field(value: &str) -> Result<String, TokenError> {
    let mut unescaped = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(idx) = rest.find('%') {
        unescaped.push_str(&rest[..idx]);
        match rest.get(idx + 1..idx + 3) {
            Some("25") => unescaped.push('%'),
            Some("3A") | Some("3a") => unescaped.push(TOKEN_DELIMITER),
            _ => {
                return Err(TokenError::MalformedPayload(
                    "invalid escape sequence in field".to_string(),
                ))
            }
        }
        rest = &rest[idx + 3..];
    }
    unescaped.push_str(rest);
    Ok(unescaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "s3cret";

    fn signed_payload(payload: &str, secret: &str) -> String {
        let encoded = PAYLOAD_ENGINE.encode(payload.as_bytes());
        let signature = sign(secret.as_bytes(), &encoded);
        format!("{encoded}:{signature}")
    }

    #[test]
    fn issue_then_verify_returns_inputs() {
        let token = issue_token("42", "a@example.com", SECRET).expect("issue");
        let later = Utc::now() + Duration::milliseconds(1);
        let claims = verify_token_at(&token, SECRET, later).expect("verify");
        assert_eq!(claims.subject_id(), "42");
        assert_eq!(claims.email(), "a@example.com");
        assert!(later.signed_duration_since(claims.issued_at()) < Duration::minutes(1));
    }

    #[test]
    fn wrong_secret_is_signature_mismatch() {
        let token = issue_token("42", "a@example.com", SECRET).expect("issue");
        assert_eq!(
            verify_token(&token, "wrong"),
            Err(TokenError::SignatureMismatch)
        );
    }

    #[test]
    fn token_older_than_window_is_expired() {
        let issued_at = Utc::now() - Duration::days(31);
        let token = issue_token_at("42", "a@example.com", SECRET, issued_at).expect("issue");
        let err = verify_token(&token, SECRET).expect_err("expired");
        assert!(err.is_expired());
        assert!(!err.is_integrity_failure());
    }

    fn whole_second(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw)
            .expect("rfc3339")
            .with_timezone(&Utc)
    }

    #[test]
    fn token_at_window_edge_is_still_valid() {
        let issued_at = whole_second("2024-01-01T00:00:00Z");
        let token = issue_token_at("42", "a@example.com", SECRET, issued_at).expect("issue");
        let claims = verify_token_at(&token, SECRET, issued_at + token_validity()).expect("valid");
        assert_eq!(claims.issued_at(), issued_at);
    }

    #[test]
    fn token_one_second_past_window_is_expired() {
        let issued_at = whole_second("2024-01-01T00:00:00Z");
        let token = issue_token_at("42", "a@example.com", SECRET, issued_at).expect("issue");
        let now = issued_at + token_validity() + Duration::seconds(1);
        assert_eq!(
            verify_token_at(&token, SECRET, now),
            Err(TokenError::TokenExpired)
        );
    }

    #[test]
    fn sub_second_issue_time_is_truncated_on_the_wire() {
        let issued_at = whole_second("2024-01-01T00:00:00.500Z");
        let token = issue_token_at("42", "a@example.com", SECRET, issued_at).expect("issue");
        let claims = verify_token_at(&token, SECRET, issued_at).expect("valid");
        assert_eq!(claims.issued_at(), whole_second("2024-01-01T00:00:00Z"));
        assert_eq!(
            verify_token_at(&token, SECRET, issued_at + token_validity()),
            Err(TokenError::TokenExpired)
        );
    }

    #[test]
    fn future_timestamp_is_not_expired() {
        let issued_at = Utc::now() + Duration::hours(2);
        let token = issue_token_at("42", "a@example.com", SECRET, issued_at).expect("issue");
        assert!(verify_token(&token, SECRET).is_ok());
    }

    #[test]
    fn malformed_shapes_are_rejected_before_signature() {
        for token in ["invalid-token", "part1:part2:part3", ":", "base64data:", ":abcd", ""] {
            assert_eq!(
                verify_token(token, SECRET),
                Err(TokenError::MalformedToken),
                "token {token:?}"
            );
        }
    }

    #[test]
    fn tampered_payload_is_signature_mismatch() {
        let token = issue_token("42", "a@example.com", SECRET).expect("issue");
        let (payload, signature) = token.split_once(':').expect("delimiter");
        let forged_payload = PAYLOAD_ENGINE.encode(b"1:admin@example.com:2099-01-01T00:00:00Z");
        assert_ne!(payload, forged_payload);
        let forged = format!("{forged_payload}:{signature}");
        assert_eq!(
            verify_token(&forged, SECRET),
            Err(TokenError::SignatureMismatch)
        );
    }

    #[test]
    fn uppercase_signature_does_not_verify() {
        let token = issue_token("42", "a@example.com", SECRET).expect("issue");
        let upper = token.to_uppercase();
        let (payload, _) = token.split_once(':').expect("delimiter");
        let (_, upper_signature) = upper.split_once(':').expect("delimiter");
        let mixed = format!("{payload}:{upper_signature}");
        assert_eq!(
            verify_token(&mixed, SECRET),
            Err(TokenError::SignatureMismatch)
        );
    }

    #[test]
    fn two_field_payload_is_malformed() {
        let token = signed_payload("42:a@example.com", SECRET);
        assert!(matches!(
            verify_token(&token, SECRET),
            Err(TokenError::MalformedPayload(_))
        ));
    }

    #[test]
    fn undecodable_payload_is_malformed() {
        let token = format!("***:{}", sign(SECRET.as_bytes(), "***"));
        assert!(matches!(
            verify_token(&token, SECRET),
            Err(TokenError::MalformedPayload(_))
        ));
    }

    #[test]
    fn bad_timestamp_is_invalid_timestamp() {
        let token = signed_payload("42:a@example.com:yesterday", SECRET);
        assert!(matches!(
            verify_token(&token, SECRET),
            Err(TokenError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn bad_escape_is_malformed_payload() {
        let token = signed_payload("4%2:a@example.com:2024-01-01T00:00:00Z", SECRET);
        assert!(matches!(
            verify_token(&token, SECRET),
            Err(TokenError::MalformedPayload(_))
        ));
    }

    #[test]
    fn delimiter_inside_fields_survives_round_trip() {
        let token = issue_token("urn:member:7", "odd%user@example.com", SECRET).expect("issue");
        let claims = verify_token(&token, SECRET).expect("verify");
        assert_eq!(claims.subject_id(), "urn:member:7");
        assert_eq!(claims.email(), "odd%user@example.com");
    }

    #[test]
    fn plain_fields_produce_legacy_payload() {
        let issued_at = DateTime::parse_from_rfc3339("2024-05-01T12:30:00Z")
            .expect("timestamp")
            .with_timezone(&Utc);
        let token = issue_token_at("42", "a@example.com", SECRET, issued_at).expect("issue");
        let (payload, signature) = token.split_once(':').expect("delimiter");
        let decoded = PAYLOAD_ENGINE.decode(payload).expect("decode");
        assert_eq!(decoded, b"42:a@example.com:2024-05-01T12:30:00Z");
        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn unpadded_payload_still_verifies() {
        let issued = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let payload = format!("7:x@example.com:{issued}");
        let unpadded = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(payload.as_bytes());
        let token = format!("{unpadded}:{}", sign(SECRET.as_bytes(), &unpadded));
        let claims = verify_token(&token, SECRET).expect("verify");
        assert_eq!(claims.subject_id(), "7");
    }

    #[test]
    fn empty_inputs_fail_validation() {
        assert_eq!(
            issue_token("", "a@example.com", SECRET),
            Err(TokenError::Validation("subject_id"))
        );
        assert_eq!(
            issue_token("42", "", SECRET),
            Err(TokenError::Validation("email"))
        );
        assert_eq!(
            issue_token("42", "a@example.com", ""),
            Err(TokenError::Validation("secret"))
        );
        assert!(TokenSecret::new("").is_err());
    }

    #[test]
    fn codec_honours_custom_validity() {
        let codec = TokenCodec::new(TokenSecret::new(SECRET).expect("secret"))
            .with_validity(Duration::minutes(5));
        let issued_at = Utc::now() - Duration::minutes(10);
        let token = codec.issue_at("42", "a@example.com", issued_at).expect("issue");
        assert_eq!(codec.verify(&token), Err(TokenError::TokenExpired));
        let claims = verify_token(&token, SECRET).expect("default window");
        assert_eq!(
            codec.expires_at(&claims),
            claims.issued_at() + Duration::minutes(5)
        );
    }

    #[test]
    fn secret_debug_is_redacted() {
        let secret = TokenSecret::new("do-not-print").expect("secret");
        let rendered = format!("{secret:?}");
        assert!(!rendered.contains("do-not-print"));
    }
}
