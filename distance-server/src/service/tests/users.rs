//! Users and sessions related API tests

use actix_web::http::StatusCode;
use actix_web::http::header;
use actix_web::test::{self, TestRequest};
use actix_web::App;
use assert_json_diff::assert_json_include;
use serde_json::json;

use crate::geocoder::fake::FakeGeocoder;
use crate::model::Model;
use crate::service;
use crate::service::tests::{authorized, call, find_distances, login, session, signup};

#[actix_web::test]
async fn health() {
    let model = Model::test(FakeGeocoder::new()).await.unwrap();
    let service_config = service::configure(model).await.unwrap();
    let app = test::init_service(App::new().configure(service_config)).await;

    let (status, body) = call(&app, TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("ok"));
}

#[actix_web::test]
async fn signup_and_login() {
    let model = Model::test(FakeGeocoder::new()).await.unwrap();
    let service_config = service::configure(model).await.unwrap();
    let app = test::init_service(App::new().configure(service_config)).await;

    let (status, body) = call(&app, signup("alice", "pw").to_request()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(
        body,
        json!({ "error": false, "Message": "User Created Successfully." })
    );

    // Username collision
    let (status, body) = call(&app, signup("alice", "other").to_request()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("alice"));

    let (status, body) = call(&app, login("alice", "pw").to_request()).await;
    assert_eq!(status, StatusCode::OK);
    assert_json_include!(actual: body, expected: json!({ "message": "Login successful" }));
    let (token, user_id) = session(&body);
    assert_eq!(token.len(), 43);
    assert!(body["logged_in_at"].is_string());

    let (status, body) = call(
        &app,
        authorized(TestRequest::get().uri("/api/users/me"), &token, Some(&user_id)).to_request(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "message": "You are authorized!", "user_id": user_id })
    );
}

#[actix_web::test]
async fn invalid_credentials() {
    let model = Model::test(FakeGeocoder::new()).await.unwrap();
    let service_config = service::configure(model).await.unwrap();
    let app = test::init_service(App::new().configure(service_config)).await;

    call(&app, signup("alice", "pw").to_request()).await;

    let wrong_password = test::call_service(&app, login("alice", "nope").to_request()).await;
    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        wrong_password
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .unwrap(),
        "Bearer"
    );
    let wrong_password: serde_json::Value = test::read_body_json(wrong_password).await;

    let (status, unknown_user) = call(&app, login("bob", "pw").to_request()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Indistinguishable failures
    assert_eq!(wrong_password, unknown_user);
    assert_eq!(unknown_user, json!({ "detail": "Invalid credentials" }));
}

#[actix_web::test]
async fn second_login_invalidates_first() {
    let model = Model::test(FakeGeocoder::new()).await.unwrap();
    let service_config = service::configure(model).await.unwrap();
    let app = test::init_service(App::new().configure(service_config)).await;

    call(&app, signup("alice", "pw").to_request()).await;
    let (_, body) = call(&app, login("alice", "pw").to_request()).await;
    let (first, user_id) = session(&body);
    let (_, body) = call(&app, login("alice", "pw").to_request()).await;
    let (second, _) = session(&body);
    assert_ne!(first, second);

    let (status, body) = call(
        &app,
        authorized(find_distances("New York", "Paris", "Both"), &first, Some(&user_id))
            .to_request(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        body,
        json!({ "detail": "Invalid user ID, invalid token, or inactive session" })
    );

    let (status, _) = call(
        &app,
        authorized(find_distances("New York", "Paris", "Both"), &second, Some(&user_id))
            .to_request(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[actix_web::test]
async fn logout() {
    let model = Model::test(FakeGeocoder::new()).await.unwrap();
    let service_config = service::configure(model).await.unwrap();
    let app = test::init_service(App::new().configure(service_config)).await;

    call(&app, signup("alice", "pw").to_request()).await;
    let (_, body) = call(&app, login("alice", "pw").to_request()).await;
    let (token, user_id) = session(&body);

    // Logout requires the token only
    let (status, body) = call(
        &app,
        authorized(TestRequest::post().uri("/api/logout"), &token, None).to_request(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "message": "Successfully logged out. Access token has been invalidated." })
    );

    let (status, body) = call(
        &app,
        authorized(TestRequest::post().uri("/api/logout"), &token, None).to_request(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({ "detail": "Token is already inactive or invalid" })
    );

    let (status, _) = call(
        &app,
        authorized(TestRequest::get().uri("/api/users/me"), &token, Some(&user_id)).to_request(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn malformed_credentials() {
    let model = Model::test(FakeGeocoder::new()).await.unwrap();
    let service_config = service::configure(model).await.unwrap();
    let app = test::init_service(App::new().configure(service_config)).await;

    call(&app, signup("alice", "pw").to_request()).await;
    let (_, body) = call(&app, login("alice", "pw").to_request()).await;
    let (token, user_id) = session(&body);

    // No authorization at all
    let resp = test::call_service(
        &app,
        TestRequest::get().uri("/api/users/me").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        resp.headers().get(header::WWW_AUTHENTICATE).unwrap(),
        "Bearer"
    );

    // Not a bearer token
    let (status, _) = call(
        &app,
        TestRequest::get()
            .uri("/api/users/me")
            .insert_header(("Authorization", format!("Basic {token}")))
            .to_request(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Malformed user id
    let (status, body) = call(
        &app,
        authorized(TestRequest::get().uri("/api/history"), &token, Some("42")).to_request(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({ "detail": "Invalid format for X-User-ID header" })
    );

    // User id required for distances
    let (status, _) = call(
        &app,
        authorized(find_distances("New York", "Paris", "Both"), &token, None).to_request(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Token of other user
    call(&app, signup("bob", "pw").to_request()).await;
    let (_, body) = call(&app, login("bob", "pw").to_request()).await;
    let (bob_token, _) = session(&body);
    let (status, _) = call(
        &app,
        authorized(TestRequest::get().uri("/api/history"), &bob_token, Some(&user_id))
            .to_request(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Token-only identification
    let (status, body) = call(
        &app,
        authorized(TestRequest::get().uri("/api/users/me"), &token, None).to_request(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], json!(user_id));
}

#[actix_web::test]
async fn unknown_paths_are_not_found() {
    let model = Model::test(FakeGeocoder::new()).await.unwrap();
    let service_config = service::configure(model).await.unwrap();
    let app = test::init_service(App::new().configure(service_config)).await;

    // No credentials required to learn the path doesn't exist
    let resp = test::call_service(&app, TestRequest::get().uri("/api/histroy").to_request()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = test::call_service(&app, TestRequest::post().uri("/api/unknown").to_request()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // Existing protected paths still require credentials
    let resp = test::call_service(&app, TestRequest::get().uri("/api/history").to_request()).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}
