//! Login related API tests

use actix_web::http::StatusCode;
use actix_web::{App, test};
use chrono::TimeDelta;
use serde_json::{Value, json};

use crate::service;
use crate::service::tests::{GraphQLResp, gql, gql_request, setup, status_of};

const STORE: &str = r#"mutation($token: TokenResponse!) {
        login {
            store(token: $token) {
                sessionKey
                state {
                    username validToken accessToken accessTokenExpirationDate hasRefreshToken
                }
            }
        }
    }"#;

const STATE: &str = r#"query {
        login {
            validToken
            state {
                username validToken accessToken accessTokenExpirationDate hasRefreshToken
            }
        }
    }"#;

const REFRESH: &str = r#"mutation($token: TokenResponse!) {
        login {
            refresh(token: $token) {
                validToken accessToken accessTokenExpirationDate hasRefreshToken
            }
        }
    }"#;

const LOGOUT: &str = r#"mutation { login { logout } }"#;

#[actix_web::test]
async fn store_and_query_session() {
    let (model, _) = setup().await;
    let app = test::init_service(App::new().configure(service::configure(false, model))).await;

    let query = gql(
        STORE,
        json!({ "token": {
            "accessToken": "abc",
            "refreshToken": "def",
            "expiresIn": 3600,
            "username": "alice",
        }}),
    );
    let resp: GraphQLResp =
        test::call_and_read_body_json(&app, gql_request(query, None).to_request()).await;

    let session_key: String = resp.data("login.store.sessionKey").unwrap();
    assert!(resp.data::<bool>("login.store.state.validToken").unwrap());
    assert_eq!(
        resp.data::<String>("login.store.state.accessTokenExpirationDate").unwrap(),
        "2024-03-01T13:00:00.000Z"
    );

    let resp: GraphQLResp = test::call_and_read_body_json(
        &app,
        gql_request(gql(STATE, json!({})), Some(&session_key)).to_request(),
    )
    .await;

    assert!(resp.data::<bool>("login.validToken").unwrap());
    assert_eq!(resp.data::<String>("login.state.username").unwrap(), "alice");
    assert_eq!(resp.data::<String>("login.state.accessToken").unwrap(), "abc");
    assert!(resp.data::<bool>("login.state.hasRefreshToken").unwrap());
}

#[actix_web::test]
async fn anonymous_state_is_empty() {
    let (model, _) = setup().await;
    let app = test::init_service(App::new().configure(service::configure(false, model))).await;

    let resp: GraphQLResp = test::call_and_read_body_json(
        &app,
        gql_request(gql(STATE, json!({})), None).to_request(),
    )
    .await;

    assert!(!resp.data::<bool>("login.validToken").unwrap());
    assert_eq!(resp.data::<Option<Value>>("login.state").unwrap(), None);
}

#[actix_web::test]
async fn expired_token_is_withheld_until_refreshed() {
    let (model, clock) = setup().await;
    let app = test::init_service(App::new().configure(service::configure(false, model))).await;

    let query = gql(STORE, json!({ "token": { "accessToken": "abc", "expiresIn": 60 }}));
    let resp: GraphQLResp =
        test::call_and_read_body_json(&app, gql_request(query, None).to_request()).await;
    let session_key: String = resp.data("login.store.sessionKey").unwrap();
    assert!(!resp.data::<bool>("login.store.state.hasRefreshToken").unwrap());

    // Exactly at the expiration instant the token is still usable
    clock.advance(TimeDelta::seconds(60));
    let resp: GraphQLResp = test::call_and_read_body_json(
        &app,
        gql_request(gql(STATE, json!({})), Some(&session_key)).to_request(),
    )
    .await;
    assert!(resp.data::<bool>("login.state.validToken").unwrap());

    clock.advance(TimeDelta::milliseconds(1));
    let resp: GraphQLResp = test::call_and_read_body_json(
        &app,
        gql_request(gql(STATE, json!({})), Some(&session_key)).to_request(),
    )
    .await;
    assert!(!resp.data::<bool>("login.state.validToken").unwrap());
    assert_eq!(resp.data::<Option<String>>("login.state.accessToken").unwrap(), None);

    let query = gql(
        REFRESH,
        json!({ "token": { "accessToken": "ghi", "refreshToken": "jkl", "expiresIn": 60 }}),
    );
    let resp: GraphQLResp = test::call_and_read_body_json(
        &app,
        gql_request(query, Some(&session_key)).to_request(),
    )
    .await;
    assert!(resp.data::<bool>("login.refresh.validToken").unwrap());
    assert_eq!(resp.data::<String>("login.refresh.accessToken").unwrap(), "ghi");
    assert_eq!(
        resp.data::<String>("login.refresh.accessTokenExpirationDate").unwrap(),
        "2024-03-01T12:02:00.001Z"
    );
    assert!(resp.data::<bool>("login.refresh.hasRefreshToken").unwrap());
}

#[actix_web::test]
async fn refresh_requires_session() {
    let (model, _) = setup().await;
    let app = test::init_service(App::new().configure(service::configure(false, model))).await;

    let query = gql(REFRESH, json!({ "token": { "accessToken": "abc", "expiresIn": 60 }}));
    let resp: GraphQLResp =
        test::call_and_read_body_json(&app, gql_request(query, None).to_request()).await;

    assert!(resp.errors.is_some_and(|errors| !errors.is_empty()));
}

#[actix_web::test]
async fn logout_closes_session() {
    let (model, _) = setup().await;
    let app = test::init_service(App::new().configure(service::configure(false, model))).await;

    let query = gql(STORE, json!({ "token": { "accessToken": "abc", "expiresIn": 60 }}));
    let resp: GraphQLResp =
        test::call_and_read_body_json(&app, gql_request(query, None).to_request()).await;
    let session_key: String = resp.data("login.store.sessionKey").unwrap();

    let resp: GraphQLResp = test::call_and_read_body_json(
        &app,
        gql_request(gql(LOGOUT, json!({})), Some(&session_key)).to_request(),
    )
    .await;
    assert!(resp.data::<bool>("login.logout").unwrap());

    // Key doesn't authenticate anymore
    let status = status_of(
        &app,
        gql_request(gql(STATE, json!({})), Some(&session_key)).to_request(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let resp: GraphQLResp = test::call_and_read_body_json(
        &app,
        gql_request(gql(LOGOUT, json!({})), None).to_request(),
    )
    .await;
    assert!(!resp.data::<bool>("login.logout").unwrap());
}
