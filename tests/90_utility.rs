mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::Value;

#[tokio::test]
async fn root_and_health() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let res = client.get(format!("{}/", server.base_url)).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    assert_eq!(body["success"], true);
    assert!(body["data"]["endpoints"].is_object());

    let res = client.get(format!("{}/health", server.base_url)).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    assert_eq!(body["data"]["store"], "memory");

    Ok(())
}

#[tokio::test]
async fn diagnostics_use_error_envelope() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let res = client.get(server.api("/notfound")).send().await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await?;
    assert_eq!(body["error"], true);
    assert_eq!(body["code"], "NOT_FOUND");

    let res = client.get(server.api("/boom")).send().await?;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let res = client.get(server.api("/version")).send().await?;
    let body: Value = res.json().await?;
    assert_eq!(body["data"]["version"], env!("CARGO_PKG_VERSION"));

    let res = client.get(server.api("/settings")).send().await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    Ok(())
}
