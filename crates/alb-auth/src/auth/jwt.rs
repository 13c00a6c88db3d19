//! Constraint validation for ALB identity tokens.
//!
//! Two constraints are checked against every parsed token:
//!
//! 1. Signed-with: header `alg` must be `ES256` and the signature must
//!    verify under the resolved public key.
//! 2. Loose valid-at: `iat` and `nbf` must not lie in the future and `exp`
//!    must not have passed, each with the configured leeway. Absent claims
//!    do not bound validity.
//!
//! Each constraint reports at most one violation; all violations are
//! collected before the token is rejected.

use crate::auth::claims::Claims;
use crate::auth::keys::KeyMaterial;
use crate::errors::{AuthError, ConstraintViolation};
use chrono::{DateTime, TimeDelta, Utc};
use common::jwt::{CompactToken, MAX_CLOCK_SKEW};
use jsonwebtoken::{crypto, Algorithm, DecodingKey};
use std::time::Duration;

/// The only signing algorithm the load balancer uses.
pub const EXPECTED_ALGORITHM: &str = "ES256";

/// Validates signature and time constraints of a parsed token.
#[derive(Debug, Clone, Copy)]
pub struct TokenValidator {
    leeway: TimeDelta,
}

impl TokenValidator {
    /// Create a validator with `clock_skew` leeway on time claims.
    ///
    /// Leeway is capped at [`MAX_CLOCK_SKEW`].
    pub fn new(clock_skew: Duration) -> Self {
        Self {
            leeway: TimeDelta::from_std(clock_skew.min(MAX_CLOCK_SKEW))
                .unwrap_or(TimeDelta::zero()),
        }
    }

    pub fn leeway(&self) -> TimeDelta {
        self.leeway
    }

    /// Validate against the current time.
    ///
    /// # Errors
    ///
    /// See [`TokenValidator::validate_at`].
    pub fn validate(
        &self,
        token: &CompactToken,
        claims: &Claims,
        key: &KeyMaterial,
    ) -> Result<(), AuthError> {
        self.validate_at(token, claims, key, Utc::now())
    }

    /// Validate against `now`.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidKey`] if the key material is not an EC public key
    /// - [`AuthError::ConstraintsViolated`] with every failed constraint
    pub fn validate_at(
        &self,
        token: &CompactToken,
        claims: &Claims,
        key: &KeyMaterial,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let mut violations = Vec::new();

        if let Some(violation) = check_signature(token, key)? {
            violations.push(violation);
        }
        if let Some(violation) = self.check_time(claims, now) {
            violations.push(violation);
        }

        if violations.is_empty() {
            tracing::debug!(target: "alb.auth.jwt", "Token constraints satisfied");
            Ok(())
        } else {
            tracing::debug!(target: "alb.auth.jwt", ?violations, "Token constraints violated");
            Err(AuthError::ConstraintsViolated(violations))
        }
    }

    fn check_time(&self, claims: &Claims, now: DateTime<Utc>) -> Option<ConstraintViolation> {
        let upper = now
            .checked_add_signed(self.leeway)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let lower = now
            .checked_sub_signed(self.leeway)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        if claims.issued_at().is_some_and(|iat| iat > upper) {
            return Some(ConstraintViolation::IssuedInFuture);
        }
        if claims.not_before().is_some_and(|nbf| nbf > upper) {
            return Some(ConstraintViolation::NotYetValid);
        }
        if claims.expires_at().is_some_and(|exp| lower >= exp) {
            return Some(ConstraintViolation::Expired);
        }
        None
    }
}

fn check_signature(
    token: &CompactToken,
    key: &KeyMaterial,
) -> Result<Option<ConstraintViolation>, AuthError> {
    if token.algorithm() != Some(EXPECTED_ALGORITHM) {
        tracing::debug!(target: "alb.auth.jwt", alg = ?token.algorithm(), "Unexpected token algorithm");
        return Ok(Some(ConstraintViolation::SignerMismatch));
    }

    let decoding_key = DecodingKey::from_ec_pem(key.as_bytes()).map_err(|e| {
        tracing::warn!(target: "alb.auth.jwt", error = %e, "Public key is not a valid EC PEM");
        AuthError::InvalidKey(e.to_string())
    })?;

    let verified = crypto::verify(
        token.encoded_signature(),
        token.signing_input(),
        &decoding_key,
        Algorithm::ES256,
    )
    .unwrap_or_else(|e| {
        tracing::debug!(target: "alb.auth.jwt", error = %e, "Signature verification errored");
        false
    });

    Ok((!verified).then_some(ConstraintViolation::SignatureMismatch))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use alb_test_utils::{TestSigningKey, TestTokenBuilder};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn parse(raw: &str) -> (CompactToken, Claims) {
        let token = CompactToken::parse(raw).unwrap();
        let claims = Claims::from_map(token.claims().clone()).unwrap();
        (token, claims)
    }

    fn violations(result: Result<(), AuthError>) -> Vec<ConstraintViolation> {
        match result {
            Err(AuthError::ConstraintsViolated(v)) => v,
            other => unreachable!("expected constraint violations, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_token_passes() {
        let key = TestSigningKey::generate();
        let raw = TestTokenBuilder::at(now())
            .kid(key.kid())
            .subject("alice")
            .issued_at(now())
            .not_before(now())
            .expires_at(now() + TimeDelta::seconds(60))
            .sign(&key);
        let (token, claims) = parse(&raw);

        let validator = TokenValidator::new(Duration::ZERO);
        validator
            .validate_at(&token, &claims, &key.public_key_pem().into(), now())
            .unwrap();
    }

    #[test]
    fn test_wrong_key_is_signature_mismatch() {
        let key = TestSigningKey::generate();
        let other = TestSigningKey::generate();
        let raw = TestTokenBuilder::at(now())
            .kid(key.kid())
            .subject("alice")
            .issued_at(now())
            .expires_at(now() + TimeDelta::seconds(60))
            .sign(&other);
        let (token, claims) = parse(&raw);

        let result = TokenValidator::new(Duration::ZERO).validate_at(
            &token,
            &claims,
            &key.public_key_pem().into(),
            now(),
        );
        assert_eq!(
            violations(result),
            vec![ConstraintViolation::SignatureMismatch]
        );
    }

    #[test]
    fn test_non_es256_is_signer_mismatch() {
        let key = TestSigningKey::generate();
        let raw = TestTokenBuilder::at(now())
            .kid(key.kid())
            .header("alg", "HS256")
            .subject("alice")
            .sign(&key);
        let (token, claims) = parse(&raw);

        let result = TokenValidator::new(Duration::ZERO).validate_at(
            &token,
            &claims,
            &key.public_key_pem().into(),
            now(),
        );
        assert_eq!(violations(result), vec![ConstraintViolation::SignerMismatch]);
    }

    #[test]
    fn test_time_violations_report_first_failure_only() {
        let key = TestSigningKey::generate();
        let future = now() + TimeDelta::hours(1);
        let raw = TestTokenBuilder::at(now())
            .kid(key.kid())
            .subject("alice")
            .issued_at(future)
            .not_before(future)
            .expires_at(now() - TimeDelta::hours(1))
            .sign(&key);
        let (token, claims) = parse(&raw);

        let result = TokenValidator::new(Duration::ZERO).validate_at(
            &token,
            &claims,
            &key.public_key_pem().into(),
            now(),
        );
        assert_eq!(violations(result), vec![ConstraintViolation::IssuedInFuture]);
    }

    #[test]
    fn test_signature_and_time_violations_are_both_reported() {
        let key = TestSigningKey::generate();
        let other = TestSigningKey::generate();
        let raw = TestTokenBuilder::at(now())
            .kid(key.kid())
            .subject("alice")
            .not_before(now() + TimeDelta::minutes(5))
            .sign(&other);
        let (token, claims) = parse(&raw);

        let result = TokenValidator::new(Duration::ZERO).validate_at(
            &token,
            &claims,
            &key.public_key_pem().into(),
            now(),
        );
        assert_eq!(
            violations(result),
            vec![
                ConstraintViolation::SignatureMismatch,
                ConstraintViolation::NotYetValid
            ]
        );
    }

    #[test]
    fn test_expiry_boundary_and_leeway() {
        let key = TestSigningKey::generate();
        let raw = TestTokenBuilder::at(now())
            .kid(key.kid())
            .subject("alice")
            .issued_at(now() - TimeDelta::minutes(2))
            .expires_at(now())
            .sign(&key);
        let (token, claims) = parse(&raw);
        let pem: KeyMaterial = key.public_key_pem().into();

        // exp == now is already expired
        let strict = TokenValidator::new(Duration::ZERO);
        assert_eq!(
            violations(strict.validate_at(&token, &claims, &pem, now())),
            vec![ConstraintViolation::Expired]
        );

        let lenient = TokenValidator::new(Duration::from_secs(30));
        lenient.validate_at(&token, &claims, &pem, now()).unwrap();
        assert_eq!(
            violations(lenient.validate_at(&token, &claims, &pem, now() + TimeDelta::seconds(30))),
            vec![ConstraintViolation::Expired]
        );
    }

    #[test]
    fn test_leeway_is_capped() {
        let validator = TokenValidator::new(Duration::from_secs(1_000_000_000_000_000));
        assert_eq!(
            validator.leeway(),
            TimeDelta::from_std(MAX_CLOCK_SKEW).unwrap()
        );
    }

    #[test]
    fn test_time_check_at_calendar_edges_does_not_overflow() {
        let key = TestSigningKey::generate();
        let raw = TestTokenBuilder::at(now())
            .kid(key.kid())
            .subject("alice")
            .sign(&key);
        let (token, claims) = parse(&raw);
        let pem: KeyMaterial = key.public_key_pem().into();
        let validator = TokenValidator::new(MAX_CLOCK_SKEW);

        assert_eq!(
            violations(validator.validate_at(&token, &claims, &pem, DateTime::<Utc>::MAX_UTC)),
            vec![ConstraintViolation::Expired]
        );
        assert_eq!(
            violations(validator.validate_at(&token, &claims, &pem, DateTime::<Utc>::MIN_UTC)),
            vec![ConstraintViolation::IssuedInFuture]
        );
    }

    #[test]
    fn test_absent_time_claims_do_not_bound_validity() {
        let key = TestSigningKey::generate();
        let raw = TestTokenBuilder::at(now())
            .kid(key.kid())
            .subject("alice")
            .without_time_claims()
            .sign(&key);
        let (token, claims) = parse(&raw);

        TokenValidator::new(Duration::ZERO)
            .validate_at(&token, &claims, &key.public_key_pem().into(), now())
            .unwrap();
    }

    #[test]
    fn test_invalid_pem_is_invalid_key() {
        let key = TestSigningKey::generate();
        let raw = TestTokenBuilder::at(now()).kid(key.kid()).subject("alice").sign(&key);
        let (token, claims) = parse(&raw);

        let result = TokenValidator::new(Duration::ZERO).validate(
            &token,
            &claims,
            &KeyMaterial::from("not a pem"),
        );
        assert!(matches!(result, Err(AuthError::InvalidKey(_))));
    }
}
