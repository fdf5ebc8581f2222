use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};

use chat_api::{ChatApiConfig, ChatApiError, ChatClient, ChatMessage, RouteStyle, SessionContext};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration, Instant};

#[derive(Clone)]
struct ResponseChunk {
    delay_ms: u64,
    bytes: Vec<u8>,
}

#[derive(Clone)]
enum ScriptedResponse {
    Respond {
        status: u16,
        content_type: &'static str,
        headers: Vec<(&'static str, String)>,
        chunks: Vec<ResponseChunk>,
    },
    /// Chunked stream that closes inside a chunk it announced.
    Truncated {
        headers: Vec<(&'static str, String)>,
        complete: Vec<u8>,
    },
    Hang,
}

#[derive(Debug, Clone)]
struct RecordedRequest {
    head: String,
    body: String,
}

impl RecordedRequest {
    fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or_default()
    }

    fn header(&self, name: &str) -> Option<String> {
        self.head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim().to_owned())
        })
    }

    fn json(&self) -> Value {
        serde_json::from_str(&self.body).expect("request body should be JSON")
    }
}

struct ScriptedServer {
    base_url: String,
    request_count: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    handle: JoinHandle<()>,
}

impl ScriptedServer {
    async fn new(scripts: Vec<ScriptedResponse>) -> Self {
        let scripts = Arc::new(scripts);
        let request_count = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("local TCP listener should bind");
        let addr = listener
            .local_addr()
            .expect("resolved local listener address");
        let base_url = format!("http://{addr}");

        let handle = tokio::spawn({
            let scripts = Arc::clone(&scripts);
            let request_count = Arc::clone(&request_count);
            let requests = Arc::clone(&requests);

            async move {
                loop {
                    let (socket, _) = match listener.accept().await {
                        Ok(pair) => pair,
                        Err(_) => break,
                    };
                    let scripts = Arc::clone(&scripts);
                    let request_count = Arc::clone(&request_count);
                    let requests = Arc::clone(&requests);
                    tokio::spawn(async move {
                        serve_one(socket, scripts, request_count, requests).await;
                    });
                }
            }
        });

        Self {
            base_url,
            request_count,
            requests,
            handle,
        }
    }

    fn request_count(&self) -> usize {
        self.request_count.load(Ordering::Acquire)
    }

    fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    fn shutdown(&self) {
        self.handle.abort();
    }
}

fn response_sse(frames: &[&str], headers: Vec<(&'static str, String)>) -> ScriptedResponse {
    ScriptedResponse::Respond {
        status: 200,
        content_type: "text/event-stream",
        headers,
        chunks: vec![ResponseChunk {
            delay_ms: 0,
            bytes: sse_frames(frames),
        }],
    }
}

fn response_json(
    status: u16,
    body: &str,
    headers: Vec<(&'static str, String)>,
) -> ScriptedResponse {
    ScriptedResponse::Respond {
        status,
        content_type: "application/json",
        headers,
        chunks: vec![ResponseChunk {
            delay_ms: 0,
            bytes: body.as_bytes().to_vec(),
        }],
    }
}

fn session_header(value: &str) -> Vec<(&'static str, String)> {
    vec![("X-Session-ID", value.to_owned())]
}

fn sse_frames(frames: &[&str]) -> Vec<u8> {
    let mut body = String::new();

    for frame in frames {
        body.push_str("data: ");
        body.push_str(frame);
        body.push_str("\n\n");
    }

    body.into_bytes()
}

fn delta(content: &str) -> String {
    serde_json::json!({"choices": [{"delta": {"content": content}}]}).to_string()
}

fn reply(content: &str) -> String {
    serde_json::json!({"choices": [{"message": {"role": "assistant", "content": content}}]})
        .to_string()
}

fn client() -> ChatClient {
    ChatClient::new(ChatApiConfig::new().with_working_directory("/srv/project")).expect("client")
}

#[tokio::test]
async fn send_returns_reply_and_adopts_session_token() {
    let server = ScriptedServer::new(vec![response_json(
        200,
        &reply("pong"),
        session_header("abc123"),
    )])
    .await;
    let context = SessionContext::new(&server.base_url, "team", "alpha");

    let text = client()
        .send(&[ChatMessage::user("ping")], &context, None)
        .await
        .expect("send should succeed");

    assert_eq!(text, "pong");
    assert_eq!(context.session_token.get().as_deref(), Some("abc123"));

    let requests = server.requests();
    assert_eq!(requests[0].request_line(), "POST /v1/inference/chat HTTP/1.1");
    assert_eq!(requests[0].header("x-session-id"), None);
    assert_eq!(
        requests[0].header("x-working-directory").as_deref(),
        Some("/srv/project")
    );
    let body = requests[0].json();
    assert_eq!(body["metadata"]["namespace"], "team");
    assert_eq!(body["metadata"]["project_id"], "alpha");
    assert_eq!(body["stream"], false);

    server.shutdown();
}

#[tokio::test]
async fn session_token_is_sent_and_replaced_by_server_value() {
    let server = ScriptedServer::new(vec![
        response_json(200, &reply("one"), Vec::new()),
        response_json(200, &reply("two"), session_header("rotated")),
    ])
    .await;
    let context = SessionContext::new(&server.base_url, "ns", "p").with_session_token("prior");
    let client = client();

    client
        .send(&[ChatMessage::user("first")], &context, None)
        .await
        .expect("first send");
    assert_eq!(context.session_token.get().as_deref(), Some("prior"));

    client
        .send(&[ChatMessage::user("second")], &context, None)
        .await
        .expect("second send");
    assert_eq!(context.session_token.get().as_deref(), Some("rotated"));

    let requests = server.requests();
    assert_eq!(requests[0].header("x-session-id").as_deref(), Some("prior"));
    assert_eq!(requests[1].header("x-session-id").as_deref(), Some("prior"));

    server.shutdown();
}

#[tokio::test]
async fn project_route_posts_to_scoped_path() {
    let server = ScriptedServer::new(vec![response_json(200, &reply("ok"), Vec::new())]).await;
    let context = SessionContext::new(&server.base_url, "team", "alpha")
        .with_route(RouteStyle::ProjectScoped);

    client()
        .send(&[ChatMessage::user("hi")], &context, None)
        .await
        .expect("send should succeed");

    let requests = server.requests();
    assert_eq!(
        requests[0].request_line(),
        "POST /v1/projects/team/alpha/chat/completions HTTP/1.1"
    );
    assert!(requests[0].json().get("metadata").is_none());

    server.shutdown();
}

#[tokio::test]
async fn non_success_status_surfaces_extracted_message() {
    let server = ScriptedServer::new(vec![response_json(
        422,
        r#"{"detail":[{"msg":"messages must not be empty"}]}"#,
        session_header("ignored"),
    )])
    .await;
    let context = SessionContext::new(&server.base_url, "ns", "p");

    let error = client()
        .send(&[], &context, None)
        .await
        .expect_err("send should fail");

    assert!(matches!(
        &error,
        ChatApiError::Status { status, message }
            if status.as_u16() == 422 && message == "messages must not be empty"
    ));
    assert!(!context.session_token.is_set());

    server.shutdown();
}

#[tokio::test]
async fn streaming_assembles_reply_and_emits_in_order() {
    let hello = delta("Hello");
    let world = delta(" world");
    let server = ScriptedServer::new(vec![response_sse(
        &[
            r#"{"choices":[{"delta":{"role":"assistant"}}]}"#,
            &hello,
            "not json at all",
            &world,
            "[DONE]",
        ],
        session_header("stream-1"),
    )])
    .await;
    let context = SessionContext::new(&server.base_url, "ns", "p");

    let mut writes = Vec::new();
    let text = client()
        .send_streaming(&[ChatMessage::user("hi")], &context, None, |chunk| {
            writes.push(chunk.to_owned())
        })
        .await
        .expect("stream should succeed");

    assert_eq!(text, "Hello world");
    assert_eq!(writes, vec!["Hello".to_owned(), " world".to_owned()]);
    assert_eq!(context.session_token.get().as_deref(), Some("stream-1"));

    let requests = server.requests();
    assert_eq!(requests[0].header("accept").as_deref(), Some("text/event-stream"));
    assert_eq!(requests[0].header("cache-control").as_deref(), Some("no-cache"));
    assert_eq!(requests[0].json()["stream"], true);

    server.shutdown();
}

#[tokio::test]
async fn streaming_read_error_aborts_and_keeps_prior_token() {
    let server = ScriptedServer::new(vec![ScriptedResponse::Truncated {
        headers: session_header("new-token"),
        complete: sse_frames(&[&delta("Hello")]),
    }])
    .await;
    let context = SessionContext::new(&server.base_url, "ns", "p").with_session_token("old-token");

    let mut writes = Vec::new();
    let error = client()
        .send_streaming(&[ChatMessage::user("hi")], &context, None, |chunk| {
            writes.push(chunk.to_owned())
        })
        .await
        .expect_err("truncated stream should fail");

    assert!(matches!(error, ChatApiError::StreamRead(_)), "{error}");
    assert_eq!(writes, vec!["Hello".to_owned()]);
    assert_eq!(context.session_token.get().as_deref(), Some("old-token"));

    server.shutdown();
}

#[tokio::test]
async fn reply_without_content_keeps_prior_token() {
    let server = ScriptedServer::new(vec![response_json(
        200,
        r#"{"choices":[]}"#,
        session_header("new-token"),
    )])
    .await;
    let context = SessionContext::new(&server.base_url, "ns", "p").with_session_token("old-token");

    let error = client()
        .send(&[ChatMessage::user("hi")], &context, None)
        .await
        .expect_err("empty choices should fail");

    assert!(matches!(error, ChatApiError::MalformedResponse(_)), "{error}");
    assert_eq!(context.session_token.get().as_deref(), Some("old-token"));

    server.shutdown();
}

#[tokio::test]
async fn streaming_chunks_reach_sink_before_stream_ends() {
    let first = delta("early");
    let last = delta(" late");
    let server = ScriptedServer::new(vec![ScriptedResponse::Respond {
        status: 200,
        content_type: "text/event-stream",
        headers: Vec::new(),
        chunks: vec![
            ResponseChunk {
                delay_ms: 0,
                bytes: sse_frames(&[&first]),
            },
            ResponseChunk {
                delay_ms: 300,
                bytes: sse_frames(&[&last, "[DONE]"]),
            },
        ],
    }])
    .await;
    let context = SessionContext::new(&server.base_url, "ns", "p");
    let started = Instant::now();

    let mut arrivals = Vec::new();
    let text = client()
        .send_streaming(&[ChatMessage::user("hi")], &context, None, |chunk| {
            arrivals.push((chunk.to_owned(), started.elapsed()))
        })
        .await
        .expect("stream should succeed");

    assert_eq!(text, "early late");
    assert_eq!(arrivals.len(), 2);
    assert!(
        arrivals[1].1 - arrivals[0].1 >= Duration::from_millis(200),
        "first chunk should be emitted before the delayed one arrives: {arrivals:?}"
    );

    server.shutdown();
}

#[tokio::test]
async fn streaming_without_done_sentinel_completes() {
    let hello = delta("Hello");
    let server =
        ScriptedServer::new(vec![response_sse(&[&hello], session_header("eof-token"))]).await;
    let context = SessionContext::new(&server.base_url, "ns", "p");

    let text = client()
        .send_streaming(&[ChatMessage::user("hi")], &context, None, |_| {})
        .await
        .expect("stream should succeed");

    assert_eq!(text, "Hello");
    assert_eq!(context.session_token.get().as_deref(), Some("eof-token"));
    server.shutdown();
}

#[tokio::test]
async fn streaming_cancellation_aborts_stuck_connection() {
    let first = delta("stream");
    let server = ScriptedServer::new(vec![ScriptedResponse::Respond {
        status: 200,
        content_type: "text/event-stream",
        headers: Vec::new(),
        chunks: vec![
            ResponseChunk {
                delay_ms: 0,
                bytes: sse_frames(&[&first]),
            },
            ResponseChunk {
                delay_ms: 10_000,
                bytes: sse_frames(&["[DONE]"]),
            },
        ],
    }])
    .await;

    let context = SessionContext::new(&server.base_url, "ns", "p");
    let client = Arc::new(client());
    let cancellation = Arc::new(AtomicBool::new(false));
    let stream_task = tokio::spawn({
        let client = Arc::clone(&client);
        let context = context.clone();
        let cancellation = Arc::clone(&cancellation);
        async move {
            client
                .send_streaming(&[ChatMessage::user("hi")], &context, Some(&cancellation), |_| {})
                .await
        }
    });

    sleep(Duration::from_millis(150)).await;
    cancellation.store(true, Ordering::Release);

    let result = timeout(Duration::from_secs(2), stream_task)
        .await
        .expect("stream task should resolve")
        .expect("join handle should resolve")
        .expect_err("cancellation should abort stream");

    assert!(matches!(result, ChatApiError::Cancelled));
    server.shutdown();
}

#[tokio::test]
async fn delete_session_targets_session_path() {
    let server = ScriptedServer::new(vec![response_json(204, "", Vec::new())]).await;

    let status = client()
        .delete_session(&format!("{}/", server.base_url), "abc123")
        .await
        .expect("delete should complete");

    assert_eq!(status.as_u16(), 204);
    assert_eq!(
        server.requests()[0].request_line(),
        "DELETE /v1/inference/chat/session/abc123 HTTP/1.1"
    );
    server.shutdown();
}

#[tokio::test]
async fn delete_session_is_bounded_by_teardown_timeout() {
    let server = ScriptedServer::new(vec![ScriptedResponse::Hang]).await;
    let client = ChatClient::new(
        ChatApiConfig::new().with_teardown_timeout(Duration::from_millis(200)),
    )
    .expect("client");
    let started = Instant::now();

    let result = client.delete_session(&server.base_url, "abc123").await;

    assert!(result.is_err());
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(server.request_count(), 1);
    server.shutdown();
}

fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        422 => "Unprocessable Entity",
        503 => "Service Unavailable",
        _ => "Error",
    }
}

async fn serve_one(
    mut socket: TcpStream,
    scripts: Arc<Vec<ScriptedResponse>>,
    request_count: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
) {
    let Ok(request) = read_request(&mut socket).await else {
        return;
    };

    let index = request_count.fetch_add(1, Ordering::AcqRel);
    requests.lock().expect("requests lock").push(request);
    let response = scripts.get(index).cloned().unwrap_or_else(|| {
        response_json(500, r#"{"error":"unexpected request"}"#, Vec::new())
    });

    match response {
        ScriptedResponse::Hang => {
            sleep(Duration::from_secs(30)).await;
        }
        ScriptedResponse::Truncated { headers, complete } => {
            let mut head = "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\n".to_owned();
            for (key, value) in headers {
                head.push_str(&format!("{key}: {value}\r\n"));
            }
            head.push_str("Transfer-Encoding: chunked\r\nConnection: close\r\n\r\n");
            let mut out = head.into_bytes();
            out.extend_from_slice(format!("{:X}\r\n", complete.len()).as_bytes());
            out.extend_from_slice(&complete);
            out.extend_from_slice(b"\r\n");
            if socket.write_all(&out).await.is_err() {
                return;
            }
            let _ = socket.flush().await;
            sleep(Duration::from_millis(50)).await;
            let _ = socket.write_all(b"400\r\ndata: {\"choi").await;
            let _ = socket.shutdown().await;
        }
        ScriptedResponse::Respond {
            status,
            content_type,
            headers,
            chunks,
        } => {
            let mut head = format!(
                "HTTP/1.1 {status} {}\r\nContent-Type: {content_type}\r\n",
                status_reason(status),
            );
            for (key, value) in headers {
                head.push_str(&format!("{key}: {value}\r\n"));
            }
            if status == 204 {
                head.push_str("Connection: close\r\n\r\n");
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.shutdown().await;
                return;
            }
            head.push_str("Transfer-Encoding: chunked\r\nConnection: close\r\n\r\n");

            if socket.write_all(head.as_bytes()).await.is_err() {
                return;
            }

            for chunk in chunks {
                if chunk.delay_ms > 0 {
                    sleep(Duration::from_millis(chunk.delay_ms)).await;
                }
                if chunk.bytes.is_empty() {
                    continue;
                }
                let prefix = format!("{:X}\r\n", chunk.bytes.len());
                if socket.write_all(prefix.as_bytes()).await.is_err() {
                    return;
                }
                if socket.write_all(&chunk.bytes).await.is_err() {
                    return;
                }
                if socket.write_all(b"\r\n").await.is_err() {
                    return;
                }
                let _ = socket.flush().await;
            }

            let _ = socket.write_all(b"0\r\n\r\n").await;
            let _ = socket.shutdown().await;
        }
    }
}

async fn read_request(socket: &mut TcpStream) -> std::io::Result<RecordedRequest> {
    let mut request = Vec::new();
    let mut buffer = [0_u8; 4096];

    let head_end = loop {
        let n = socket.read(&mut buffer).await?;
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        request.extend_from_slice(&buffer[..n]);
        if let Some(position) = request.windows(4).position(|window| window == b"\r\n\r\n") {
            break position + 4;
        }
    };

    let head = String::from_utf8_lossy(&request[..head_end]).into_owned();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);

    while request.len() < head_end + content_length {
        let n = socket.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        request.extend_from_slice(&buffer[..n]);
    }

    let body = String::from_utf8_lossy(&request[head_end..]).into_owned();
    Ok(RecordedRequest { head, body })
}
