//! Login state held on behalf of a client

use async_graphql::{InputObject, SimpleObject};
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::model::clock::Clock;
use crate::model::validity::SessionValidator;

/// Authentication state of a client
///
/// Field names follow the frontend store. Every field may be missing: an anonymous client has an
/// empty state, and a partially filled one is never considered logged in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginState {
    /// Bearer credential for the platform API
    #[serde(default, alias = "access_token")]
    pub access_token: Option<String>,
    /// When `access_token` stops being accepted
    #[serde(default, alias = "access_token_expiration_date")]
    pub access_token_expiration_date: Option<String>,
    /// Credential used to obtain a new access token
    #[serde(default, alias = "refresh_token")]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

/// Response of the OAuth2 token endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, InputObject)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    #[serde(default)]
    pub username: Option<String>,
}

impl LoginState {
    /// Login state obtained from a fresh token response
    pub fn from_token(token: TokenResponse, now: DateTime<Utc>) -> Self {
        let mut state = Self::default();
        state.apply_token(token, now);
        state
    }

    /// Takes over credentials from a token response received at `now`
    ///
    /// A response without a refresh token keeps the one already held; the same goes for the
    /// username.
    pub fn apply_token(&mut self, token: TokenResponse, now: DateTime<Utc>) {
        let TokenResponse {
            access_token,
            refresh_token,
            expires_in,
            username,
        } = token;

        let lifetime = TimeDelta::try_seconds(expires_in).unwrap_or(if expires_in < 0 {
            TimeDelta::MIN
        } else {
            TimeDelta::MAX
        });
        let expires_at = now
            .checked_add_signed(lifetime)
            .unwrap_or(if expires_in < 0 {
                DateTime::<Utc>::MIN_UTC
            } else {
                DateTime::<Utc>::MAX_UTC
            });

        self.access_token = Some(access_token);
        self.access_token_expiration_date =
            Some(expires_at.to_rfc3339_opts(SecondsFormat::Millis, true));

        if refresh_token.is_some() {
            self.refresh_token = refresh_token;
        }
        if username.is_some() {
            self.username = username;
        }
    }

    /// The access token, but only while the validator accepts this state
    pub fn usable_access_token<C: Clock>(&self, validator: &SessionValidator<C>) -> Option<&str> {
        if validator.is_valid(self) {
            self.access_token.as_deref()
        } else {
            None
        }
    }

    /// Public view of the state as seen by `validator`
    pub fn view<C: Clock>(&self, validator: &SessionValidator<C>) -> LoginView {
        LoginView {
            username: self.username.clone(),
            valid_token: validator.is_valid(self),
            access_token: self.usable_access_token(validator).map(str::to_owned),
            access_token_expiration_date: self.access_token_expiration_date.clone(),
            has_refresh_token: self.refresh_token.is_some(),
        }
    }
}

/// Login state as exposed through the API
#[derive(Debug, Clone, PartialEq, Eq, SimpleObject)]
pub struct LoginView {
    pub username: Option<String>,
    /// Whether the access token may be used right now
    pub valid_token: bool,
    /// Present only together with `valid_token`
    pub access_token: Option<String>,
    pub access_token_expiration_date: Option<String>,
    pub has_refresh_token: bool,
}
