//! TOTP two-factor helpers (RFC 6238: SHA1, 6 digits, 30 s step, ±1 step).
//!
//! Enrolment is two-step: [`start_enrollment`] hands out a secret and a
//! recovery code, and the account only counts as protected once a code
//! produced from that secret has been verified.

use chrono::{DateTime, Utc};
use data_encoding::BASE32;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;
use thiserror::Error;
use totp_rs::{Algorithm, TOTP};

use crate::token;

/// Raw secret length in bytes (160 bits).
pub const SECRET_LEN: usize = 20;
const RECOVERY_CODE_BYTES: usize = 12;
const DIGITS: usize = 6;
const SKEW: u8 = 1;
const STEP_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum TwoFactorError {
    #[error("invalid two-factor secret")]
    InvalidSecret,
    #[error("totp setup failed: {0}")]
    Setup(String),
}

/// Material shown to the user once at enrolment.
#[derive(Debug, Clone, Serialize)]
pub struct TwoFactorEnrollment {
    pub secret: String,
    pub otpauth_url: String,
    pub recovery_code: String,
}

/// What the account keeps from an enrolment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEnrollment {
    pub secret: String,
    pub recovery_digest: String,
}

/// Generate a secret and recovery code for `account_name`.
pub fn start_enrollment(
    issuer: &str,
    account_name: &str,
) -> Result<(TwoFactorEnrollment, StoredEnrollment), TwoFactorError> {
    let mut raw = vec![0u8; SECRET_LEN];
    OsRng.fill_bytes(&mut raw);
    let secret = BASE32.encode(&raw);

    let totp = TOTP::new(
        Algorithm::SHA1,
        DIGITS,
        SKEW,
        STEP_SECS,
        raw,
        Some(issuer.to_string()),
        account_name.to_string(),
    )
    .map_err(|e| TwoFactorError::Setup(e.to_string()))?;

    let recovery_code = generate_recovery_code();
    let stored = StoredEnrollment {
        secret: secret.clone(),
        recovery_digest: recovery_digest(&recovery_code),
    };

    Ok((
        TwoFactorEnrollment {
            secret,
            otpauth_url: totp.get_url(),
            recovery_code,
        },
        stored,
    ))
}

fn verifier(secret: &str) -> Result<TOTP, TwoFactorError> {
    let raw = BASE32
        .decode(secret.as_bytes())
        .map_err(|_| TwoFactorError::InvalidSecret)?;
    TOTP::new(Algorithm::SHA1, DIGITS, SKEW, STEP_SECS, raw, None, String::new())
        .map_err(|e| TwoFactorError::Setup(e.to_string()))
}

fn unix_secs(at: DateTime<Utc>) -> u64 {
    u64::try_from(at.timestamp()).unwrap_or(0)
}

/// Check a 6-digit code at `at`, tolerating one step of clock drift.
pub fn verify_code(secret: &str, code: &str, at: DateTime<Utc>) -> bool {
    let code = code.trim();
    if code.len() != DIGITS || !code.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    match verifier(secret) {
        Ok(totp) => totp.check(code, unix_secs(at)),
        Err(_) => false,
    }
}

/// The code an authenticator app would show at `at`.
pub fn code_at(secret: &str, at: DateTime<Utc>) -> Result<String, TwoFactorError> {
    Ok(verifier(secret)?.generate(unix_secs(at)))
}

/// 12 random bytes as upper-case hex in dash-separated groups of four.
pub fn generate_recovery_code() -> String {
    let mut bytes = [0u8; RECOVERY_CODE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    let hex = hex::encode_upper(bytes);
    hex.as_bytes()
        .chunks(4)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect::<Vec<_>>()
        .join("-")
}

/// Upper-case and drop dashes/whitespace so users can type codes loosely.
pub fn normalize_recovery_code(input: &str) -> String {
    input
        .chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

pub fn recovery_digest(code: &str) -> String {
    token::digest(&normalize_recovery_code(code))
}
