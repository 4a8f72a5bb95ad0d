//! Login-related queries

use async_graphql::{Context, Object, Result};

use crate::model::Model;
use crate::model::login::LoginView;
use crate::model::sessions::LoginSession;

#[derive(Debug, Default)]
pub struct LoginQueries;

#[Object]
impl LoginQueries {
    /// Login state of the current session, null for anonymous requests.
    ///
    /// The access token is only returned while it is valid.
    async fn state(&self, ctx: &Context<'_>) -> Result<Option<LoginView>> {
        let Some(session) = ctx.data_opt::<LoginSession>() else {
            return Ok(None);
        };
        let model: &Model = ctx.data()?;

        Ok(Some(session.login.view(model.validator())))
    }

    /// Whether the current session holds a usable access token
    async fn valid_token(&self, ctx: &Context<'_>) -> Result<bool> {
        let model: &Model = ctx.data()?;
        Ok(ctx
            .data_opt::<LoginSession>()
            .is_some_and(|session| model.validator().is_valid(&session.login)))
    }
}
