//! Login-related mutations

use async_graphql::{Context, Object, Result, SimpleObject};
use tracing::{info, instrument};

use crate::model::Model;
use crate::model::login::{LoginState, LoginView, TokenResponse};
use crate::model::sessions::{LoginSession, SessionKey};

/// Type returned when a new session is stored
#[derive(Debug, Clone, SimpleObject)]
struct CreatedSession {
    /// Key to pass as `Authorization: Session {key}`
    session_key: SessionKey,
    /// Stored login state
    state: LoginView,
}

#[derive(Debug, Default)]
pub struct LoginMutations;

#[Object]
impl LoginMutations {
    /// Stores the login state obtained from a token response in a new session. Returns the session
    /// key addressing it.
    #[instrument(skip_all)]
    async fn store(&self, ctx: &Context<'_>, token: TokenResponse) -> Result<CreatedSession> {
        let model: &Model = ctx.data()?;
        let now = model.now();

        let login = LoginState::from_token(token, now);
        let (session, session_key) = LoginSession::create(model.db(), login, now).await?;
        info!(session = %session.id, "Stored login session");

        Ok(CreatedSession {
            session_key,
            state: session.login.view(model.validator()),
        })
    }

    /// Replaces credentials of the current session with a new token response, eg. after the
    /// access token was refreshed.
    #[instrument(skip_all)]
    async fn refresh(&self, ctx: &Context<'_>, token: TokenResponse) -> Result<LoginView> {
        let session: &LoginSession = ctx.data_opt().ok_or("Unauthorized")?;
        let model: &Model = ctx.data()?;
        let now = model.now();

        let mut session = session.clone();
        session.login.apply_token(token, now);
        session.update(model.db(), now).await?;
        info!(session = %session.id, "Refreshed login session");

        Ok(session.login.view(model.validator()))
    }

    /// Closes the current session. Returns false if there was no session.
    #[instrument(skip_all)]
    async fn logout(&self, ctx: &Context<'_>) -> Result<bool> {
        let Some(session) = ctx.data_opt::<LoginSession>() else {
            return Ok(false);
        };
        let model: &Model = ctx.data()?;

        let id = session.id;
        session.clone().logout(model.db()).await?;
        info!(session = %id, "Closed login session");

        Ok(true)
    }
}
