//! A CLI smoke test that spawns the real `architectd` binary as a
//! subprocess, the way the corpus's own CLI crate drives its binary
//! through `assert_cmd` rather than only in-process. `http_surface.rs`
//! already exercises the router directly via `tower::ServiceExt::oneshot`;
//! this file is the complement that proves the binary itself starts up,
//! parses its arguments, and serves the route table over a real socket.

use std::net::TcpListener;
use std::time::Duration;

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn help_prints_usage_and_exits_cleanly() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("architectd")?;
    cmd.arg("--help");
    cmd.assert().success().stdout(predicate::str::contains("Usage"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn serves_the_project_list_route_as_a_real_process() -> Result<(), Box<dyn std::error::Error>> {
    let port = free_port()?;
    let mut child = Command::cargo_bin("architectd")?.arg("--bind").arg(format!("127.0.0.1:{port}")).spawn()?;

    let url = format!("http://127.0.0.1:{port}/api/projects");
    let response = wait_for_server(&url).await;

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let projects: Vec<serde_json::Value> = response.json().await?;
    assert!(projects.is_empty());

    child.kill()?;
    child.wait()?;
    Ok(())
}

/// Binds an ephemeral port and releases it immediately so `architectd`
/// can bind it in turn; brief enough that the race with another process
/// grabbing it first is not worth guarding against here.
fn free_port() -> std::io::Result<u16> {
    Ok(TcpListener::bind("127.0.0.1:0")?.local_addr()?.port())
}

async fn wait_for_server(url: &str) -> reqwest::Response {
    for _ in 0..40 {
        if let Ok(response) = reqwest::get(url).await {
            return response;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("architectd never started listening on {url}");
}
