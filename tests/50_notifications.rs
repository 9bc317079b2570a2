mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{json, Value};

#[tokio::test]
async fn notifications_read_and_purge() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();
    let account = common::signup(server, "notes").await?;

    let res = client
        .post(server.api("/notifications"))
        .bearer_auth(&account.token)
        .json(&json!({ "type": "billing", "message": "Invoice ready" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: Value = res.json().await?;
    let id = created["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(created["data"]["is_read"], false);

    let unread: Value = client
        .get(server.api("/notifications/unread"))
        .bearer_auth(&account.token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(unread["data"]["unread"], 1);

    let res = client
        .post(server.api("/notifications/markread"))
        .bearer_auth(&account.token)
        .json(&json!([id]))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    let unread: Value = client
        .get(server.api("/notifications/unread"))
        .bearer_auth(&account.token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(unread["data"]["unread"], 0);

    let res = client
        .post(server.api("/notifications/purge"))
        .bearer_auth(&account.token)
        .json(&json!([id]))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = client
        .get(server.api(&format!("/notifications/{}", id)))
        .bearer_auth(&account.token)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    Ok(())
}
