//! Main query entry point

use async_graphql::Object;
use derivative::Derivative;

mod login;

#[derive(Debug, Derivative)]
#[derivative(Default = "new")]
pub struct Query {
    /// Login related queries
    login: login::LoginQueries,
}

#[Object]
impl Query {
    async fn login(&self) -> &login::LoginQueries {
        &self.login
    }
}
