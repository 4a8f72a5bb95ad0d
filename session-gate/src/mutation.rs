//! Mutations main entry point

use async_graphql::Object;
use derivative::Derivative;

mod login;

#[derive(Debug, Derivative)]
#[derivative(Default = "new")]
pub struct Mutation {
    /// Login related mutations
    login: login::LoginMutations,
}

#[Object]
impl Mutation {
    async fn login(&self) -> &login::LoginMutations {
        &self.login
    }
}
