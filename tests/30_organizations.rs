mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{json, Value};

#[tokio::test]
async fn create_rename_and_list() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();
    let account = common::signup(server, "orgs").await?;

    let res = client
        .post(server.api("/organizations"))
        .bearer_auth(&account.token)
        .json(&json!({ "name": "Side Project" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: Value = res.json().await?;
    let id = created["data"]["id"].as_str().unwrap().to_string();
    let version = created["data"]["version"].as_i64().unwrap();

    let res = client
        .patch(server.api(&format!("/organizations/{}?version={}", id, version)))
        .bearer_auth(&account.token)
        .json(&json!([{ "op": "replace", "path": "/name", "value": "Main Project" }]))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    // The stale version no longer matches
    let res = client
        .patch(server.api(&format!("/organizations/{}?version={}", id, version)))
        .bearer_auth(&account.token)
        .json(&json!([{ "op": "replace", "path": "/name", "value": "Lost Update" }]))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let listed: Value = client
        .get(server.api("/organizations"))
        .bearer_auth(&account.token)
        .send()
        .await?
        .json()
        .await?;
    let names: Vec<&str> = listed["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|o| o["name"].as_str())
        .collect();
    assert!(names.contains(&"Main Project"));
    assert!(names.contains(&"orgs org"));

    Ok(())
}

#[tokio::test]
async fn invite_flow_adds_new_member() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();
    let admin = common::signup(server, "inviter").await?;
    let invitee = common::unique_email("invitee");

    let res = client
        .post(server.api("/organizations/invites"))
        .bearer_auth(&admin.token)
        .json(&json!({ "email_address": invitee, "full_name": "Invited Person" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    assert_eq!(body["data"]["invited"], true);

    let pending: Value = client
        .get(server.api("/organizations/invites"))
        .bearer_auth(&admin.token)
        .send()
        .await?
        .json()
        .await?;
    let invites = pending["data"].as_array().unwrap();
    assert_eq!(invites.len(), 1);
    assert!(invites[0].get("token").is_none());

    let res = client
        .delete(server.api(&format!("/organizations/invites/{}", invitee)))
        .bearer_auth(&admin.token)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    let pending: Value = client
        .get(server.api("/organizations/invites"))
        .bearer_auth(&admin.token)
        .send()
        .await?
        .json()
        .await?;
    assert!(pending["data"].as_array().unwrap().is_empty());

    Ok(())
}

#[tokio::test]
async fn unknown_invite_token_is_404() -> Result<()> {
    let server = common::ensure_server().await?;
    let res = reqwest::Client::new()
        .get(server.api("/organizations/invites/does-not-exist"))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    Ok(())
}
