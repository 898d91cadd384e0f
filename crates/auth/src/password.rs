//! Password policy engine: validation, generation, strength and hashing.
//!
//! Generation always draws from the operating system CSPRNG (or a caller
//! supplied `CryptoRng`), and guarantees every required character class is
//! present in the output.

use argon2::password_hash::{PasswordHash, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, PasswordHasher as _, Version};
use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use rand::{CryptoRng, Rng, RngCore};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use warden_core::{DomainError, ValueObject};

/// Length used by [`generate`] when the policy leaves `min_length` at zero.
pub const DEFAULT_GENERATED_LENGTH: usize = 12;

// ─────────────────────────────────────────────────────────────────────────────
// Policy
// ─────────────────────────────────────────────────────────────────────────────

/// Password complexity and lifecycle rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_numbers: bool,
    pub require_special: bool,
    /// How many previous passwords may not be reused (0 disables the check).
    pub prevent_reuse: usize,
    /// Days until a password expires (0 disables expiry).
    pub expiry_days: u32,
    /// Whether a completed self-service reset flags the next login for a
    /// mandatory change.
    pub force_change_after_reset: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            require_uppercase: true,
            require_lowercase: true,
            require_numbers: true,
            require_special: true,
            prevent_reuse: 3,
            expiry_days: 90,
            force_change_after_reset: false,
        }
    }
}

impl ValueObject for PasswordPolicy {}

impl PasswordPolicy {
    /// Character classes this policy requires, in a fixed order.
    pub fn required_classes(&self) -> Vec<CharClass> {
        let mut classes = Vec::with_capacity(4);
        if self.require_uppercase {
            classes.push(CharClass::Uppercase);
        }
        if self.require_lowercase {
            classes.push(CharClass::Lowercase);
        }
        if self.require_numbers {
            classes.push(CharClass::Digit);
        }
        if self.require_special {
            classes.push(CharClass::Special);
        }
        classes
    }
}

/// Character classes recognized by the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharClass {
    Uppercase,
    Lowercase,
    Digit,
    Special,
}

impl CharClass {
    pub const ALL: [CharClass; 4] = [
        CharClass::Uppercase,
        CharClass::Lowercase,
        CharClass::Digit,
        CharClass::Special,
    ];

    /// Generation alphabet. Confusable glyphs (I, O, l, 0, 1) are left out.
    pub fn alphabet(self) -> &'static str {
        match self {
            CharClass::Uppercase => "ABCDEFGHJKLMNPQRSTUVWXYZ",
            CharClass::Lowercase => "abcdefghijkmnopqrstuvwxyz",
            CharClass::Digit => "23456789",
            CharClass::Special => "!@#$%^&*()_+-=[]{}|;:,.<>?",
        }
    }

    /// Validation predicate. Any non-alphanumeric character counts as special.
    pub fn matches(self, c: char) -> bool {
        match self {
            CharClass::Uppercase => c.is_ascii_uppercase(),
            CharClass::Lowercase => c.is_ascii_lowercase(),
            CharClass::Digit => c.is_ascii_digit(),
            CharClass::Special => !c.is_ascii_alphanumeric(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Validation
// ─────────────────────────────────────────────────────────────────────────────

/// A single unmet password rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyViolation {
    #[error("password must be at least {min} characters long")]
    TooShort { min: usize },
    #[error("password must contain an uppercase letter")]
    MissingUppercase,
    #[error("password must contain a lowercase letter")]
    MissingLowercase,
    #[error("password must contain a digit")]
    MissingNumber,
    #[error("password must contain a special character")]
    MissingSpecial,
    #[error("password must not reuse any of the last {count} passwords")]
    Reused { count: usize },
}

impl PolicyViolation {
    fn missing(class: CharClass) -> Self {
        match class {
            CharClass::Uppercase => PolicyViolation::MissingUppercase,
            CharClass::Lowercase => PolicyViolation::MissingLowercase,
            CharClass::Digit => PolicyViolation::MissingNumber,
            CharClass::Special => PolicyViolation::MissingSpecial,
        }
    }
}

/// Convert a non-empty violation list into the domain error.
pub fn violations_to_error(violations: &[PolicyViolation]) -> DomainError {
    DomainError::policy(violations.iter().map(ToString::to_string))
}

/// Check `password` against every complexity rule of `policy`.
///
/// Returns all unmet rules at once. Reuse is checked separately by
/// [`PasswordHasher::check_reuse`] since it needs stored hashes.
pub fn validate(password: &str, policy: &PasswordPolicy) -> Result<(), Vec<PolicyViolation>> {
    let mut violations = Vec::new();

    if password.chars().count() < policy.min_length {
        violations.push(PolicyViolation::TooShort {
            min: policy.min_length,
        });
    }

    for class in policy.required_classes() {
        if !password.chars().any(|c| class.matches(c)) {
            violations.push(PolicyViolation::missing(class));
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Generation
// ─────────────────────────────────────────────────────────────────────────────

/// Generate a password satisfying `policy` from the OS CSPRNG.
pub fn generate(policy: &PasswordPolicy) -> String {
    generate_with(policy, &mut OsRng)
}

/// Generate a password satisfying `policy` from the given CSPRNG.
///
/// Length is `min_length` (or [`DEFAULT_GENERATED_LENGTH`] when zero), raised
/// to the number of required classes if that is larger. Characters come from
/// the union of the required alphabets, or all four when none is required.
pub fn generate_with<R>(policy: &PasswordPolicy, rng: &mut R) -> String
where
    R: RngCore + CryptoRng + ?Sized,
{
    let required = policy.required_classes();
    let drawn_from = if required.is_empty() {
        CharClass::ALL.to_vec()
    } else {
        required.clone()
    };

    let target = if policy.min_length == 0 {
        DEFAULT_GENERATED_LENGTH
    } else {
        policy.min_length
    };
    let length = target.max(required.len());

    let alphabet: Vec<char> = drawn_from
        .iter()
        .flat_map(|class| class.alphabet().chars())
        .collect();

    let mut chars: Vec<char> = (0..length)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())])
        .collect();

    repair(&mut chars, &required, rng);
    chars.into_iter().collect()
}

/// Make sure every required class appears at least once.
///
/// A missing class overwrites a random position whose character is not the
/// only representative of another required class, so one repair never undoes
/// another. With `chars.len() >= required.len()` such a position always exists.
fn repair<R>(chars: &mut [char], required: &[CharClass], rng: &mut R)
where
    R: RngCore + CryptoRng + ?Sized,
{
    for &class in required {
        if chars.iter().any(|&c| class.matches(c)) {
            continue;
        }

        let candidates: Vec<usize> = (0..chars.len())
            .filter(|&i| {
                required
                    .iter()
                    .filter(|other| other.matches(chars[i]))
                    .all(|other| chars.iter().filter(|&&c| other.matches(c)).count() > 1)
            })
            .collect();

        let pool: Vec<char> = class.alphabet().chars().collect();
        if let (Some(&pos), Some(&replacement)) = (candidates.choose(rng), pool.choose(rng)) {
            chars[pos] = replacement;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Strength
// ─────────────────────────────────────────────────────────────────────────────

/// Coarse strength estimate shown next to password inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PasswordStrength {
    /// 0 (very weak) to 4 (strong).
    pub score: u8,
    pub label: &'static str,
}

/// Score a password: one point each for length ≥ 8, length ≥ 12, and each
/// character class present, capped at 4.
pub fn strength(password: &str) -> PasswordStrength {
    let len = password.chars().count();
    let mut score = 0u8;
    if len >= 8 {
        score += 1;
    }
    if len >= 12 {
        score += 1;
    }
    for class in CharClass::ALL {
        if password.chars().any(|c| class.matches(c)) {
            score += 1;
        }
    }
    let score = score.min(4);

    let label = match score {
        0 => "Very weak",
        1 => "Weak",
        2 => "Fair",
        3 => "Good",
        _ => "Strong",
    };

    PasswordStrength { score, label }
}

// ─────────────────────────────────────────────────────────────────────────────
// Hashing
// ─────────────────────────────────────────────────────────────────────────────

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashingParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashingParams {
    /// OWASP recommended minimum for argon2id.
    fn default() -> Self {
        Self {
            memory_kib: 19_456,
            iterations: 2,
            parallelism: 1,
        }
    }
}

#[derive(Debug, Error)]
#[error("password hashing failed: {0}")]
pub struct HashError(String);

/// Argon2id password hasher producing PHC strings.
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    params: Params,
}

impl PasswordHasher {
    pub fn new(params: HashingParams) -> Result<Self, HashError> {
        let params = Params::new(params.memory_kib, params.iterations, params.parallelism, None)
            .map_err(|e| HashError(e.to_string()))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    pub fn hash(&self, password: &str) -> Result<String, HashError> {
        let salt = SaltString::generate(&mut argon2::password_hash::rand_core::OsRng);
        let hash = self
            .argon2()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| HashError(e.to_string()))?;
        Ok(hash.to_string())
    }

    /// Verify against a stored PHC string. Malformed hashes never verify.
    pub fn verify(&self, password: &str, stored: &str) -> bool {
        match PasswordHash::new(stored) {
            Ok(parsed) => self
                .argon2()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                tracing::warn!(error = %e, "stored password hash is malformed");
                false
            }
        }
    }

    /// Reject `password` if it matches the current hash or one of the most
    /// recent `policy.prevent_reuse` entries of `history` (newest first).
    pub fn check_reuse(
        &self,
        password: &str,
        current: Option<&str>,
        history: &[String],
        policy: &PasswordPolicy,
    ) -> Result<(), PolicyViolation> {
        if policy.prevent_reuse == 0 {
            return Ok(());
        }
        let reused = current
            .into_iter()
            .chain(history.iter().take(policy.prevent_reuse).map(String::as_str))
            .any(|stored| self.verify(password, stored));
        if reused {
            Err(PolicyViolation::Reused {
                count: policy.prevent_reuse,
            })
        } else {
            Ok(())
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
