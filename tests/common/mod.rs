use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde_json::{json, Value};

pub const PASSWORD: &str = "Password123";

static SERVER: OnceLock<TestServer> = OnceLock::new();
static SEQUENCE: AtomicU64 = AtomicU64::new(0);

pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    #[allow(dead_code)]
    child: Child,
}

impl TestServer {
    fn spawn() -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        // Spawn the already-built binary to keep start fast during tests
        // Assumes debug profile; adjust if you run tests with --release
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_orgbase-api"));
        cmd.env("ORGBASE_API_PORT", port.to_string())
            .env("API_HOST", "127.0.0.1")
            .env("APP_ENV", "development")
            .env("STORAGE_PROVIDER", "memory")
            .env("SMTP_HOST", "")
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let child = cmd.spawn().context("failed to spawn server binary")?;

        Ok(Self { port, base_url, child })
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() > deadline {
                break;
            }
            let url = format!("{}/health", self.base_url);
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status() == StatusCode::OK || resp.status() == StatusCode::SERVICE_UNAVAILABLE {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }

    pub fn api(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }
}

pub async fn ensure_server() -> Result<&'static TestServer> {
    // Use stable get_or_init and convert init errors into a panic with context.
    let server = SERVER.get_or_init(|| TestServer::spawn().expect("failed to spawn server binary"));
    server.wait_ready(Duration::from_secs(10)).await?;
    Ok(server)
}

/// Email address no other test in this run will use
pub fn unique_email(prefix: &str) -> String {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos()).unwrap_or_default();
    let n = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}-{}@example.com", prefix, nanos, n)
}

/// A signed up account with its own organization
#[allow(dead_code)]
pub struct Account {
    pub email: String,
    pub token: String,
}

pub async fn signup(server: &TestServer, prefix: &str) -> Result<Account> {
    let email = unique_email(prefix);
    let res = reqwest::Client::new()
        .post(server.api("/auth/signup"))
        .json(&json!({
            "name": prefix,
            "email": email,
            "password": PASSWORD,
            "organization_name": format!("{} org", prefix),
        }))
        .send()
        .await?;
    anyhow::ensure!(res.status() == StatusCode::OK, "signup failed with {}", res.status());
    let body: Value = res.json().await?;
    let token = body["data"]["token"].as_str().context("signup returned no token")?.to_string();
    Ok(Account { email, token })
}
