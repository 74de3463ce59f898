//! Condition validation.
//!
//! Enforces the validity window and audience restrictions of an assertion's
//! `Conditions`, and the window of every subject confirmation that carries
//! data. Windows are inclusive at `NotBefore` and exclusive at
//! `NotOnOrAfter`, both widened by the configured clock skew.

use chrono::{DateTime, Utc};

use crate::config::ValidationParameters;
use crate::error::{SamlError, SamlResult};
use crate::types::{Assertion, AudienceRestriction, Conditions};

/// Validates the audiences of one audience restriction.
pub trait AudienceValidator: Send + Sync {
    /// Returns `Ok(())` if the audiences are acceptable.
    fn validate(&self, audiences: &[String], params: &ValidationParameters) -> SamlResult<()>;
}

impl<F> AudienceValidator for F
where
    F: Fn(&[String], &ValidationParameters) -> SamlResult<()> + Send + Sync,
{
    fn validate(&self, audiences: &[String], params: &ValidationParameters) -> SamlResult<()> {
        self(audiences, params)
    }
}

/// Default audience policy: at least one audience must be configured as
/// valid, compared by exact string equality. Empty sets fail closed.
pub fn validate_audience_default(audiences: &[String], params: &ValidationParameters) -> SamlResult<()> {
    if !params.config.validate_audience {
        return Ok(());
    }

    let reject = |reason: &str| {
        Err(SamlError::InvalidAudience {
            audiences: audiences.to_vec(),
            reason: reason.to_string(),
        })
    };

    if audiences.is_empty() {
        return reject("audience restriction lists no audiences");
    }
    if params.config.valid_audiences.is_empty() {
        return reject("no valid audiences are configured");
    }
    if audiences
        .iter()
        .any(|audience| params.config.valid_audiences.contains(audience))
    {
        Ok(())
    } else {
        reject("none of the audiences is valid")
    }
}

/// Validates assertion conditions and subject confirmation data.
pub struct ConditionValidator<'p> {
    params: &'p ValidationParameters,
}

impl<'p> ConditionValidator<'p> {
    /// Creates a validator over the given parameters.
    #[must_use]
    pub const fn new(params: &'p ValidationParameters) -> Self {
        Self { params }
    }

    /// Validates the top-level conditions at `now`.
    ///
    /// Absent conditions are valid unless an expiration time is required.
    pub fn validate(&self, conditions: Option<&Conditions>, now: DateTime<Utc>) -> SamlResult<()> {
        let Some(conditions) = conditions else {
            return self.check_window(None, None, now, self.params.config.require_expiration_time);
        };

        self.check_window(
            conditions.not_before,
            conditions.not_on_or_after,
            now,
            self.params.config.require_expiration_time,
        )?;

        if conditions.one_time_use {
            return Err(SamlError::UnsupportedCondition("OneTimeUse".to_string()));
        }
        if conditions.proxy_restriction.is_some() {
            return Err(SamlError::UnsupportedCondition("ProxyRestriction".to_string()));
        }
        if let Some(custom) = conditions.custom_conditions.first() {
            return Err(SamlError::UnsupportedCondition(custom.clone()));
        }

        for restriction in &conditions.audience_restrictions {
            self.validate_audience_restriction(restriction)?;
        }
        Ok(())
    }

    /// Validates the window of every subject confirmation carrying data.
    ///
    /// The assertion must have a subject.
    pub fn validate_subject_confirmations(
        &self,
        assertion: &Assertion,
        now: DateTime<Utc>,
    ) -> SamlResult<()> {
        let subject = assertion.subject.as_ref().ok_or_else(|| SamlError::SubjectMissing {
            assertion_id: assertion.id.clone(),
        })?;

        for confirmation in &subject.subject_confirmations {
            let Some(data) = &confirmation.subject_confirmation_data else {
                continue;
            };
            self.check_window(data.not_before, data.not_on_or_after, now, false)?;
        }
        Ok(())
    }

    /// Checks a `NotBefore`/`NotOnOrAfter` window.
    pub fn validate_lifetime(
        &self,
        not_before: Option<DateTime<Utc>>,
        not_on_or_after: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> SamlResult<()> {
        self.check_window(
            not_before,
            not_on_or_after,
            now,
            self.params.config.require_expiration_time,
        )
    }

    fn check_window(
        &self,
        not_before: Option<DateTime<Utc>>,
        not_on_or_after: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        require_expiration: bool,
    ) -> SamlResult<()> {
        if !self.params.config.validate_lifetime {
            return Ok(());
        }

        if let (Some(not_before), Some(not_on_or_after)) = (not_before, not_on_or_after) {
            if not_before > not_on_or_after {
                return Err(SamlError::InvalidLifetime {
                    not_before,
                    not_on_or_after,
                });
            }
        }

        let skew = self.params.config.clock_skew();

        if let Some(not_before) = not_before {
            let latest_now = now.checked_add_signed(skew).unwrap_or(DateTime::<Utc>::MAX_UTC);
            if not_before > latest_now {
                return Err(SamlError::AssertionNotYetValid { not_before, now });
            }
        }

        match not_on_or_after {
            Some(not_on_or_after) => {
                let earliest_now = now.checked_sub_signed(skew).unwrap_or(DateTime::<Utc>::MIN_UTC);
                if not_on_or_after <= earliest_now {
                    return Err(SamlError::AssertionExpired {
                        not_on_or_after,
                        now,
                    });
                }
            }
            None if require_expiration => return Err(SamlError::MissingExpiration),
            None => {}
        }

        Ok(())
    }

    fn validate_audience_restriction(&self, restriction: &AudienceRestriction) -> SamlResult<()> {
        match &self.params.audience_validator {
            Some(validator) => validator.validate(&restriction.audiences, self.params),
            None => validate_audience_default(&restriction.audiences, self.params),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::config::ValidationConfig;
    use crate::error::ErrorKind;
    use crate::types::{NameId, Subject, SubjectConfirmation, SubjectConfirmationData};

    const SP: &str = "https://sp.example.com";

    fn params(skew_secs: u64) -> ValidationParameters {
        ValidationParameters::new(
            ValidationConfig::new()
                .clock_skew_secs(skew_secs)
                .valid_audience(SP),
        )
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn window_is_inclusive_then_exclusive() {
        let params = params(0);
        let validator = ConditionValidator::new(&params);
        let now = now();

        let starts_now = Conditions::between(now, now + Duration::minutes(5));
        assert!(validator.validate(Some(&starts_now), now).is_ok());

        let ends_now = Conditions::between(now - Duration::minutes(5), now);
        let err = validator.validate(Some(&ends_now), now).unwrap_err();
        assert!(matches!(err, SamlError::AssertionExpired { .. }));
    }

    #[test]
    fn skew_widens_the_window() {
        let params = params(60);
        let validator = ConditionValidator::new(&params);
        let now = now();

        let expired_recently = Conditions::between(now - Duration::minutes(5), now - Duration::seconds(30));
        assert!(validator.validate(Some(&expired_recently), now).is_ok());

        let expired = Conditions::between(now - Duration::minutes(5), now - Duration::seconds(61));
        assert_eq!(
            validator.validate(Some(&expired), now).unwrap_err().kind(),
            ErrorKind::ConditionViolation
        );

        let future = Conditions::between(now + Duration::seconds(61), now + Duration::minutes(5));
        assert!(matches!(
            validator.validate(Some(&future), now),
            Err(SamlError::AssertionNotYetValid { .. })
        ));
    }

    #[test]
    fn inverted_window_is_a_lifetime_error() {
        let params = params(0);
        let now = now();
        let inverted = Conditions::between(now + Duration::minutes(5), now - Duration::minutes(5));
        assert!(matches!(
            ConditionValidator::new(&params).validate(Some(&inverted), now),
            Err(SamlError::InvalidLifetime { .. })
        ));
    }

    #[test]
    fn lifetime_checks_can_be_disabled() {
        let mut params = params(0);
        params.config.validate_lifetime = false;
        let now = now();
        let expired = Conditions::between(now - Duration::hours(2), now - Duration::hours(1));
        assert!(ConditionValidator::new(&params).validate(Some(&expired), now).is_ok());
    }

    #[test]
    fn expiration_can_be_required() {
        let mut params = params(0);
        assert!(ConditionValidator::new(&params).validate(None, now()).is_ok());

        params.config.require_expiration_time = true;
        assert!(matches!(
            ConditionValidator::new(&params).validate(None, now()),
            Err(SamlError::MissingExpiration)
        ));
    }

    #[test]
    fn unsupported_conditions_are_rejected() {
        let params = params(0);
        let validator = ConditionValidator::new(&params);

        let one_time = Conditions::default().one_time_use();
        assert!(matches!(
            validator.validate(Some(&one_time), now()),
            Err(SamlError::UnsupportedCondition(_))
        ));

        let custom = Conditions {
            custom_conditions: vec!["urn:custom#Condition".to_string()],
            ..Conditions::default()
        };
        assert_eq!(
            validator.validate(Some(&custom), now()).unwrap_err().kind(),
            ErrorKind::ConditionViolation
        );
    }

    #[test]
    fn audience_policy() {
        let params = params(0);
        let validator = ConditionValidator::new(&params);

        let ok = Conditions::default().with_audience(SP);
        assert!(validator.validate(Some(&ok), now()).is_ok());

        let other = Conditions::default().with_audience("https://other.example.com");
        let err = validator.validate(Some(&other), now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AudienceRejected);

        let empty = Conditions {
            audience_restrictions: vec![AudienceRestriction::default()],
            ..Conditions::default()
        };
        assert!(validator.validate(Some(&empty), now()).is_err());

        let unconfigured = ValidationParameters::new(ValidationConfig::new());
        assert!(ConditionValidator::new(&unconfigured)
            .validate(Some(&ok), now())
            .is_err());
    }

    #[test]
    fn custom_audience_validator_replaces_default() {
        let params = params(0).with_audience_validator(
            |audiences: &[String], _: &ValidationParameters| -> SamlResult<()> {
                if audiences.iter().any(|a| a.ends_with(".example.org")) {
                    Ok(())
                } else {
                    Err(SamlError::InvalidAudience {
                        audiences: audiences.to_vec(),
                        reason: "not an example.org audience".to_string(),
                    })
                }
            },
        );
        let validator = ConditionValidator::new(&params);

        let org = Conditions::default().with_audience("https://app.example.org");
        assert!(validator.validate(Some(&org), now()).is_ok());

        let sp = Conditions::default().with_audience(SP);
        assert!(validator.validate(Some(&sp), now()).is_err());
    }

    #[test]
    fn subject_confirmations_with_data_are_checked() {
        let params = params(0);
        let validator = ConditionValidator::new(&params);
        let now = now();

        let no_subject = Assertion::new("https://idp.example.com");
        assert_eq!(
            validator
                .validate_subject_confirmations(&no_subject, now)
                .unwrap_err()
                .kind(),
            ErrorKind::SubjectMissing
        );

        let expired_data = SubjectConfirmationData {
            not_on_or_after: Some(now - Duration::seconds(1)),
            ..SubjectConfirmationData::default()
        };
        let assertion = Assertion::new("https://idp.example.com").with_subject(
            Subject::new(NameId::new("alice"))
                .with_confirmation(SubjectConfirmation::bearer())
                .with_confirmation(SubjectConfirmation::bearer().with_data(expired_data)),
        );
        assert!(matches!(
            validator.validate_subject_confirmations(&assertion, now),
            Err(SamlError::AssertionExpired { .. })
        ));

        let without_data = Assertion::new("https://idp.example.com").with_subject(
            Subject::new(NameId::new("alice")).with_confirmation(SubjectConfirmation::bearer()),
        );
        assert!(validator.validate_subject_confirmations(&without_data, now).is_ok());
    }
}
