//! Access token validity
//!
//! The validator answers whether the access token held in a login state may still be attached to
//! outgoing requests. It fails closed: a missing token, a missing expiration date, or an expiration
//! date that cannot be read all make the state invalid. The token stays valid up to and including
//! the expiration instant.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::model::clock::{Clock, SystemClock};
use crate::model::login::LoginState;

/// Outcome of the validity check with the reason behind it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    /// Token may be used until `expires_at`
    Valid { expires_at: DateTime<Utc> },
    /// No access token, or an empty one
    MissingToken,
    /// No expiration date, or an empty one
    MissingExpiration,
    /// Expiration date is not a recognized timestamp
    MalformedExpiration,
    /// Token stopped being valid at `expired_at`
    Expired { expired_at: DateTime<Utc> },
}

impl Validity {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }

    /// Short machine readable reason
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Valid { .. } => "valid",
            Self::MissingToken => "missing_token",
            Self::MissingExpiration => "missing_expiration",
            Self::MalformedExpiration => "malformed_expiration",
            Self::Expired { .. } => "expired",
        }
    }
}

impl fmt::Display for Validity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Valid { expires_at } => write!(f, "valid until {expires_at}"),
            Self::Expired { expired_at } => write!(f, "expired at {expired_at}"),
            other => f.write_str(other.reason()),
        }
    }
}

/// Decides whether a login state holds a usable access token
#[derive(Debug, Clone, Default)]
pub struct SessionValidator<C = SystemClock> {
    clock: C,
}

impl<C: Clock> SessionValidator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    /// Clock the validator evaluates against
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Checks the login state at the current instant of the clock
    pub fn check(&self, login: &LoginState) -> Validity {
        if login.access_token.as_deref().is_none_or(str::is_empty) {
            return Validity::MissingToken;
        }

        let Some(expiration) = login
            .access_token_expiration_date
            .as_deref()
            .filter(|exp| !exp.is_empty())
        else {
            return Validity::MissingExpiration;
        };

        let now = self.clock.now();
        let Some(exp) = parse_expiration(expiration) else {
            return Validity::MalformedExpiration;
        };

        if now > exp {
            Validity::Expired { expired_at: exp }
        } else {
            Validity::Valid { expires_at: exp }
        }
    }

    pub fn is_valid(&self, login: &LoginState) -> bool {
        self.check(login).is_valid()
    }
}

/// Checks the login state against the wall clock
pub fn has_valid_token(login: &LoginState) -> bool {
    SessionValidator::<SystemClock>::default().is_valid(login)
}

/// Reads an expiration date
///
/// Accepts RFC 3339, ISO-8601 date-time without offset (as UTC), ISO-8601 date (as UTC midnight)
/// and RFC 2822, in that order.
pub fn parse_expiration(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(exp) = DateTime::parse_from_rfc3339(raw) {
        return Some(exp.with_timezone(&Utc));
    }

    if let Ok(exp) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(exp.and_utc());
    }

    if let Ok(exp) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return exp.and_hms_opt(0, 0, 0).map(|exp| exp.and_utc());
    }

    DateTime::parse_from_rfc2822(raw)
        .ok()
        .map(|exp| exp.with_timezone(&Utc))
}
