// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end scenarios driving a real `mewd` over a real TCP socket and
//! real WebSocket clients, the way `abp-daemon`'s own websocket test suite
//! drove its daemon: bind `127.0.0.1:0`, spawn `axum::serve` in the
//! background, then dial the resolved address.

use mew_config::{CapabilityEntry, GatewayConfig, KindPattern, ParticipantConfig};
use mew_envelope::Envelope;
use mew_gateway_core::{build_app, GatewayState};
use mew_participant::Client;
use mew_transport::WsClientTransport;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::net::TcpListener;

struct Harness {
    addr: std::net::SocketAddr,
    _audit_dir: tempfile::TempDir,
}

impl Harness {
    async fn spawn(mut config: GatewayConfig) -> Self {
        let audit_dir = tempfile::tempdir().unwrap();
        config.logs_dir = Some(audit_dir.path().to_string_lossy().to_string());

        let audit = mew_audit::AuditLogger::open(audit_dir.path()).await.unwrap();
        let registry = mew_registry::Registry::new(&config.tokens, config.ephemeral_grants);
        let state = std::sync::Arc::new(GatewayState::new(config, registry, audit));
        let app = build_app(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, _audit_dir: audit_dir }
    }

    fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    fn http_base(&self) -> String {
        format!("http://{}", self.addr)
    }

    async fn join(&self, space: &str, token: &str, participant_id: &str) -> (Client, mew_participant::Welcome) {
        let transport = WsClientTransport::connect(&self.ws_url(), None).await.unwrap();
        Client::connect(
            Box::new(transport),
            space,
            token,
            participant_id,
            Duration::from_secs(5),
        )
        .await
        .unwrap()
    }
}

fn config_with_participants(entries: Vec<(&str, &str, Vec<CapabilityEntry>)>) -> GatewayConfig {
    let mut tokens = BTreeMap::new();
    let mut participants = BTreeMap::new();
    for (token, id, capabilities) in entries {
        tokens.insert(token.to_string(), id.to_string());
        participants.insert(
            id.to_string(),
            ParticipantConfig {
                display_name: None,
                capabilities,
            },
        );
    }
    GatewayConfig {
        space: "demo".into(),
        tokens,
        participants,
        ..Default::default()
    }
}

fn cap(kind: &str) -> CapabilityEntry {
    CapabilityEntry {
        kind: KindPattern::One(kind.to_string()),
        to: None,
        payload: None,
    }
}

/// S1 — a chat envelope sent by one participant is delivered verbatim to
/// its named recipient, with `from` stamped by the gateway.
#[tokio::test]
async fn echo_between_two_participants() {
    let config = config_with_participants(vec![
        ("secret-a", "agent-a", vec![cap("chat")]),
        ("secret-b", "agent-b", vec![cap("chat")]),
    ]);
    let harness = Harness::spawn(config).await;

    let (a, _) = harness.join("demo", "secret-a", "agent-a").await;
    let (b, welcome_b) = harness.join("demo", "secret-b", "agent-b").await;
    assert!(welcome_b.roster.contains(&"agent-a".to_string()));

    a.send(Envelope::new("chat", serde_json::json!({"text": "hi"})).to(["agent-b"]))
        .await
        .unwrap();

    let received = tokio::time::timeout(Duration::from_secs(2), b.recv())
        .await
        .expect("did not receive in time")
        .expect("channel closed");
    assert_eq!(received.kind.as_str(), "chat");
    assert_eq!(received.from.as_deref(), Some("agent-a"));
    assert_eq!(received.payload["text"], "hi");
}

/// S4 — an envelope whose kind is not in the sender's effective capability
/// set is denied with a `system/error{capability_denied}` reply and never
/// reaches the intended recipient.
#[tokio::test]
async fn capability_denial_blocks_delivery() {
    let config = config_with_participants(vec![
        ("secret-a", "agent-a", vec![]),
        ("secret-b", "agent-b", vec![cap("chat")]),
    ]);
    let harness = Harness::spawn(config).await;

    let (a, _) = harness.join("demo", "secret-a", "agent-a").await;
    let (b, _) = harness.join("demo", "secret-b", "agent-b").await;

    a.send(Envelope::new("chat", serde_json::json!({"text": "nope"})).to(["agent-b"]))
        .await
        .unwrap();

    let reply = tokio::time::timeout(Duration::from_secs(2), a.recv())
        .await
        .expect("expected a system/error reply")
        .expect("channel closed");
    assert_eq!(reply.kind.as_str(), "system/error");
    assert_eq!(reply.payload["code"], "capability_denied");

    let nothing = tokio::time::timeout(Duration::from_millis(200), b.recv()).await;
    assert!(nothing.is_err(), "agent-b should never have received the denied chat");
}

/// S6 — `stream/request` allocates a stream id, notifies both the
/// requester and its recipient via `stream/open`, and `stream/close`
/// revokes write authorization.
#[tokio::test]
async fn stream_lifecycle_open_then_close() {
    let config = config_with_participants(vec![
        ("secret-a", "agent-a", vec![cap("stream/request"), cap("stream/close")]),
        ("secret-b", "agent-b", vec![]),
    ]);
    let harness = Harness::spawn(config).await;

    let (a, _) = harness.join("demo", "secret-a", "agent-a").await;
    let (b, _) = harness.join("demo", "secret-b", "agent-b").await;

    a.send(Envelope::new("stream/request", serde_json::json!({})).to(["agent-b"]))
        .await
        .unwrap();

    let opened_to_a = tokio::time::timeout(Duration::from_secs(2), a.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(opened_to_a.kind.as_str(), "stream/open");
    let stream_id = opened_to_a.payload["streamId"].as_str().unwrap().to_string();

    let opened_to_b = tokio::time::timeout(Duration::from_secs(2), b.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(opened_to_b.payload["streamId"], stream_id);

    a.send(Envelope::new("stream/close", serde_json::json!({"streamId": stream_id})).to(["agent-b"]))
        .await
        .unwrap();
    // No reply is expected for stream/close; give the gateway a beat to
    // process it before the connections drop at the end of the test.
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// S2 — one participant's `tools/call` `mcp/request` is answered by the
/// other's registered tool handler, correlated back to the request id.
#[tokio::test]
async fn mcp_tool_call_round_trip() {
    let config = config_with_participants(vec![
        ("secret-a", "agent-a", vec![cap("mcp/request")]),
        ("secret-b", "agent-b", vec![]),
    ]);
    let harness = Harness::spawn(config).await;

    let (a, _) = harness.join("demo", "secret-a", "agent-a").await;
    let (b, _) = harness.join("demo", "secret-b", "agent-b").await;
    b.tools().register(
        "double",
        "doubles a number",
        serde_json::json!({"type": "object"}),
        |args: serde_json::Value| async move {
            let n = args["n"].as_i64().unwrap_or(0);
            Ok(serde_json::json!({"result": n * 2}))
        },
    );

    let request = Envelope::new(
        "mcp/request",
        serde_json::json!({"method": "tools/call", "params": {"name": "double", "arguments": {"n": 21}}}),
    )
    .to(["agent-b"]);
    let response = tokio::time::timeout(Duration::from_secs(2), a.call(request))
        .await
        .expect("call timed out")
        .expect("call failed");

    assert_eq!(response.kind.as_str(), "mcp/response");
    assert_eq!(response.payload["content"]["result"], 42);
}

/// S6 (HTTP surface) — injecting a message via `POST
/// /participants/{id}/messages` reaches a connected WebSocket participant
/// exactly as a native send would. Speaks raw HTTP/1.1 over a `TcpStream`
/// since this crate carries no HTTP client dependency.
#[tokio::test]
async fn http_injection_reaches_connected_participant() {
    let config = config_with_participants(vec![
        ("secret-hook", "webhook", vec![cap("chat")]),
        ("secret-b2", "agent-b2", vec![]),
    ]);
    let harness = Harness::spawn(config).await;

    let (b, _) = harness.join("demo", "secret-b2", "agent-b2").await;

    let body = serde_json::json!({
        "kind": "chat",
        "to": ["agent-b2"],
        "payload": {"text": "from webhook"},
    })
    .to_string();
    let response = post_json(&harness.http_base(), "/participants/webhook/messages", "secret-hook", &body).await;
    assert!(response.starts_with("HTTP/1.1 202"), "unexpected status line: {response}");

    let received = tokio::time::timeout(Duration::from_secs(2), b.recv())
        .await
        .expect("did not receive injected message")
        .expect("channel closed");
    assert_eq!(received.kind.as_str(), "chat");
    assert_eq!(received.from.as_deref(), Some("webhook"));
    assert_eq!(received.payload["text"], "from webhook");
}

/// S3 — an under-privileged participant's `mcp/proposal` is fulfilled by a
/// privileged peer after a `capability/grant` widens the proposer's
/// capability set; the proposer observes the fulfillment's response
/// correlated back to its original proposal.
#[tokio::test]
async fn proposal_grant_then_fulfillment_round_trip() {
    let config = config_with_participants(vec![
        ("secret-op", "operator", vec![cap("capability/grant")]),
        ("secret-agent", "agent", vec![cap("mcp/proposal")]),
        ("secret-fs", "file-server", vec![cap("mcp/request")]),
    ]);
    let harness = Harness::spawn(config).await;

    let (operator, _) = harness.join("demo", "secret-op", "operator").await;
    let (agent, _) = harness.join("demo", "secret-agent", "agent").await;
    let (file_server, _) = harness.join("demo", "secret-fs", "file-server").await;

    let proposal = Envelope::new(
        "mcp/proposal",
        serde_json::json!({"method": "tools/call", "params": {"name": "write_file", "arguments": {"path": "foo.txt"}}}),
    )
    .to(["file-server"]);
    let proposal_id = proposal.id.clone();
    let agent_call = tokio::spawn(async move { agent.call(proposal).await });

    let seen_proposal = tokio::time::timeout(Duration::from_secs(2), file_server.recv())
        .await
        .expect("file-server never saw the proposal")
        .expect("channel closed");
    assert_eq!(seen_proposal.kind.as_str(), "mcp/proposal");

    operator
        .send(
            Envelope::new(
                "capability/grant",
                serde_json::json!({"capabilities": [{"kind": "mcp/request"}]}),
            )
            .to(["agent"]),
        )
        .await
        .unwrap();
    // Give the gateway a beat to apply the grant before the fulfillment
    // attempts to use the newly-granted capability.
    tokio::time::sleep(Duration::from_millis(50)).await;

    file_server
        .send(
            Envelope::new("mcp/request", serde_json::json!({"result": "written"}))
                .to(["agent"])
                .with_correlation(vec![seen_proposal.id.clone()].into()),
        )
        .await
        .unwrap();

    let response = tokio::time::timeout(Duration::from_secs(2), agent_call)
        .await
        .expect("proposer never observed the fulfillment")
        .unwrap()
        .expect("call failed");
    assert_eq!(response.correlation_id.first(), Some(proposal_id.as_str()));
    assert_eq!(response.payload["result"], "written");
}

/// S5 — a `participant/pause{timeout_seconds}` produces a
/// `participant/resume`-equivalent auto-resume within `[T, T + 2s]` with no
/// explicit `participant/resume` sent by the driver.
#[tokio::test]
async fn pause_with_timeout_auto_resumes() {
    let config = config_with_participants(vec![
        ("secret-op", "operator", vec![cap("participant/pause")]),
        (
            "secret-ctl",
            "control-agent",
            vec![cap("participant/status"), cap("participant/resume")],
        ),
    ]);
    let harness = Harness::spawn(config).await;

    let (operator, _) = harness.join("demo", "secret-op", "operator").await;
    let (_control, _) = harness.join("demo", "secret-ctl", "control-agent").await;

    operator
        .send(Envelope::new("participant/pause", serde_json::json!({"timeout_seconds": 1})).to(["control-agent"]))
        .await
        .unwrap();

    let status = tokio::time::timeout(Duration::from_secs(2), operator.recv())
        .await
        .expect("control-agent never replied to pause")
        .expect("channel closed");
    assert_eq!(status.kind.as_str(), "participant/status");
    assert_eq!(status.payload["status"], "paused");

    let resume = tokio::time::timeout(Duration::from_secs(4), operator.recv())
        .await
        .expect("no auto-resume observed within the deadline")
        .expect("channel closed");
    assert_eq!(resume.kind.as_str(), "participant/resume");

    let active_status = tokio::time::timeout(Duration::from_secs(1), operator.recv())
        .await
        .expect("no trailing active status observed")
        .expect("channel closed");
    assert_eq!(active_status.kind.as_str(), "participant/status");
    assert_eq!(active_status.payload["status"], "active");
}

async fn post_json(base: &str, path: &str, bearer: &str, body: &str) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let addr = base.trim_start_matches("http://");
    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "POST {path} HTTP/1.1\r\nHost: {addr}\r\nAuthorization: Bearer {bearer}\r\nContent-Type: application/json\r\nContent-Length: {len}\r\nConnection: close\r\n\r\n{body}",
        len = body.len(),
    );
    stream.write_all(request.as_bytes()).await.unwrap();
    stream.shutdown().await.unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}
