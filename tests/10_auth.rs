mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{json, Value};

#[tokio::test]
async fn signup_then_login() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();
    let account = common::signup(server, "signup").await?;

    let res = client
        .post(server.api("/auth/login"))
        .json(&json!({ "email": account.email, "password": common::PASSWORD }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["token"].as_str().map(str::len), Some(40));

    Ok(())
}

#[tokio::test]
async fn login_failures_use_error_envelope() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let res = client
        .post(server.api("/auth/login"))
        .json(&json!({ "password": "whatever" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await?;
    assert_eq!(body["error"], true);
    assert_eq!(body["message"], "Email Address is required.");

    let res = client
        .post(server.api("/auth/login"))
        .json(&json!({ "email": common::unique_email("nobody"), "password": common::PASSWORD }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn check_email_address_reports_taken() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();
    let account = common::signup(server, "check").await?;

    let taken = client
        .get(server.api(&format!("/auth/check-email-address/{}", account.email)))
        .send()
        .await?;
    assert_eq!(taken.status(), StatusCode::CREATED);

    let free = client
        .get(server.api(&format!("/auth/check-email-address/{}", common::unique_email("free"))))
        .send()
        .await?;
    assert_eq!(free.status(), StatusCode::NO_CONTENT);

    Ok(())
}

#[tokio::test]
async fn forgot_password_always_succeeds() -> Result<()> {
    let server = common::ensure_server().await?;
    let res = reqwest::Client::new()
        .get(server.api("/auth/forgot-password"))
        .query(&[("email_address", common::unique_email("forgot"))])
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn bad_tokens_are_rejected() -> Result<()> {
    let server = common::ensure_server().await?;
    let res = reqwest::Client::new()
        .get(server.api("/users/me"))
        .bearer_auth("0000000000000000000000000000000000000000")
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    Ok(())
}
