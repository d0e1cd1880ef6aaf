use crate::relay::assembler::Assembler;
use crate::relay::config::RelayConfig;
use futures::StreamExt;
use localchat_core::frame::EVENT_STREAM;
use localchat_core::llm::{ChatClient, ChatError, ChatRequest, TurnStream};
use localchat_core::turn::{FinishReason, TurnUpdate};
use reqwest::{header, Client, StatusCode};
use std::time::Instant;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const USER_NAME_HEADER: &str = "x-user-name";

#[derive(Clone)]
pub struct RelayClient {
    http: Client,
    cfg: RelayConfig,
}

impl RelayClient {
    pub fn new(cfg: RelayConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(2)
            .connect_timeout(cfg.timeout)
            .build()?;
        Ok(Self { http, cfg })
    }

    pub fn config(&self) -> &RelayConfig {
        &self.cfg
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.cfg.base_url.trim_end_matches('/'), path)
    }

    /// The name header mirrors the request's `userName`, so the relay sees
    /// one name per call.
    fn post(&self, path: &str, req: &ChatRequest) -> reqwest::RequestBuilder {
        let mut rb = self.http.post(self.endpoint(path)).json(req);
        if let Some(name) = req.user_name.as_deref().filter(|n| !n.trim().is_empty()) {
            rb = rb.header(USER_NAME_HEADER, name);
        }
        rb
    }
}

#[allow(async_fn_in_trait)]
impl ChatClient for RelayClient {
    async fn complete(&self, req: &ChatRequest) -> Result<serde_json::Value, ChatError> {
        let mut req = req.clone();
        req.stream = Some(false);
        let resp = self
            .post("/api/complete", &req)
            .timeout(self.cfg.stream_idle_timeout)
            .send()
            .await
            .map_err(map_reqwest_err)?;
        if !resp.status().is_success() {
            return Err(map_status_err(resp.status(), resp.text().await.ok()));
        }
        resp.json()
            .await
            .map_err(|e| ChatError::Decode(e.to_string()))
    }

    fn stream_turn(&self, req: ChatRequest, cancel: CancellationToken) -> TurnStream<'_> {
        let url = self.endpoint("/api/stream");
        info!(target:"providers::relay","start turn url={} prompt_len={}", url, req.prompt.len());
        let send = self
            .post("/api/stream", &req)
            .header(header::ACCEPT, EVENT_STREAM)
            .send();
        let idle = self.cfg.stream_idle_timeout;

        let s = async_stream::stream! {
            let mut asm = Assembler::new();
            let resp = tokio::select! {
                _ = cancel.cancelled() => None,
                r = send => Some(r),
            };
            let resp = match resp {
                None => {
                    if let Some(message) = asm.cancel() {
                        yield TurnUpdate::Finalized { message, reason: FinishReason::Canceled };
                    }
                    return;
                }
                Some(Err(e)) => {
                    let e = map_reqwest_err(e);
                    error!(target:"providers::relay","turn request failed: {}", e);
                    if let Some(message) = asm.fail(&e) {
                        yield TurnUpdate::Finalized { reason: FinishReason::Failed(e.to_string()), message };
                    }
                    return;
                }
                Some(Ok(r)) => r,
            };
            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.ok();
                error!(target:"providers::relay","turn non-200 status={} body={:?}", status, body);
                let e = map_status_err(status, body);
                if let Some(message) = asm.fail(&e) {
                    yield TurnUpdate::Finalized { reason: FinishReason::Failed(e.to_string()), message };
                }
                return;
            }

            let mut stream = resp.bytes_stream();
            let mut last = Instant::now();
            'outer: loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!(target:"providers::relay","turn canceled after {} bytes of text", asm.text().len());
                        if let Some(message) = asm.cancel() {
                            yield TurnUpdate::Finalized { message, reason: FinishReason::Canceled };
                        }
                        break 'outer;
                    }
                    chunk = stream.next() => {
                        match chunk {
                            Some(Ok(b)) => {
                                last = Instant::now();
                                for u in asm.push(&b) {
                                    yield u;
                                }
                                if asm.is_finalized() { break 'outer; }
                            }
                            Some(Err(e)) => {
                                let e = map_reqwest_err(e);
                                warn!(target:"providers::relay","turn body error: {}", e);
                                if let Some(message) = asm.fail(&e) {
                                    yield TurnUpdate::Finalized { reason: FinishReason::Failed(e.to_string()), message };
                                }
                                break 'outer;
                            }
                            None => {
                                if let Some(message) = asm.finish() {
                                    yield TurnUpdate::Finalized { message, reason: FinishReason::EndOfStream };
                                }
                                break 'outer;
                            }
                        }
                    }
                    _ = tokio::time::sleep(Duration::from_millis(500)) => {
                        if last.elapsed() > idle {
                            let e = ChatError::Timeout("idle".into());
                            if let Some(message) = asm.fail(&e) {
                                yield TurnUpdate::Finalized { reason: FinishReason::Failed(e.to_string()), message };
                            }
                            break 'outer;
                        }
                    }
                }
            }
            // dropping the body stream here releases the connection
        };
        Box::pin(s)
    }
}

fn map_reqwest_err(e: reqwest::Error) -> ChatError {
    if e.is_timeout() {
        ChatError::Timeout(e.to_string())
    } else if e.is_request() || e.is_connect() || e.is_body() {
        ChatError::Network(e.to_string())
    } else if e.is_decode() {
        ChatError::Decode(e.to_string())
    } else {
        ChatError::Other(e.to_string())
    }
}

fn map_status_err(status: StatusCode, body: Option<String>) -> ChatError {
    ChatError::Status {
        status: status.as_u16(),
        body: body.unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{HeaderMap, StatusCode as AxumStatus},
        response::IntoResponse,
        routing::post,
        Json, Router,
    };
    use futures::stream;
    use localchat_core::turn::Message;
    use std::convert::Infallible;
    use std::sync::{Arc, Mutex};

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client(base_url: String) -> RelayClient {
        RelayClient::new(RelayConfig {
            base_url,
            user_name: Some("Alice".into()),
            ..Default::default()
        })
        .unwrap()
    }

    async fn run(client: &RelayClient, cancel: CancellationToken) -> Vec<TurnUpdate> {
        let req = client.config().chat_request("Hi");
        client.stream_turn(req, cancel).collect().await
    }

    fn last_message(us: &[TurnUpdate]) -> (Message, FinishReason) {
        match us.last() {
            Some(TurnUpdate::Finalized { message, reason }) => (message.clone(), reason.clone()),
            other => panic!("turn did not finalize: {:?}", other),
        }
    }

    #[tokio::test]
    async fn streams_fragments_split_across_chunks() {
        let app = Router::new().route(
            "/api/stream",
            post(|headers: HeaderMap| async move {
                assert_eq!(headers[USER_NAME_HEADER], "Alice");
                assert_eq!(headers[header::ACCEPT.as_str()], EVENT_STREAM);
                let chunks = vec![
                    "data: {\"choices\":[{\"te",
                    "xt\":\"Hel\"}]}\n\ndata: {\"choices\":[{\"text\":\"lo\"}]}",
                    "\n\ndata: [DONE]\n\n",
                ];
                let body = Body::from_stream(stream::iter(
                    chunks.into_iter().map(Ok::<_, Infallible>),
                ));
                ([(header::CONTENT_TYPE.as_str(), EVENT_STREAM)], body).into_response()
            }),
        );
        let c = client(serve(app).await);
        let us = run(&c, CancellationToken::new()).await;
        assert_eq!(us.len(), 3);
        assert_eq!(us[0], TurnUpdate::Updated("Hel".into()));
        assert_eq!(us[1], TurnUpdate::Updated("Hello".into()));
        let (m, reason) = last_message(&us);
        assert_eq!(m.text, "Hello");
        assert_eq!(reason, FinishReason::Sentinel);
    }

    #[tokio::test]
    async fn name_header_follows_the_request() {
        let seen: Arc<Mutex<Vec<Option<String>>>> = Arc::default();
        let seen_up = seen.clone();
        let app = Router::new().route(
            "/api/stream",
            post(move |headers: HeaderMap| {
                let seen_up = seen_up.clone();
                async move {
                    let name = headers
                        .get(USER_NAME_HEADER)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    seen_up.lock().unwrap().push(name);
                    "data: [DONE]\n\n"
                }
            }),
        );
        let c = client(serve(app).await);

        let mut renamed = c.config().chat_request("Hi");
        renamed.user_name = Some("Bob".into());
        let _: Vec<_> = c.stream_turn(renamed, CancellationToken::new()).collect().await;

        let mut cleared = c.config().chat_request("Hi");
        cleared.user_name = None;
        let _: Vec<_> = c.stream_turn(cleared, CancellationToken::new()).collect().await;

        assert_eq!(*seen.lock().unwrap(), vec![Some("Bob".to_string()), None]);
    }

    #[tokio::test]
    async fn body_error_keeps_streamed_text_before_the_error() {
        let app = Router::new().route(
            "/api/stream",
            post(|| async {
                let first = stream::iter([Ok::<_, std::io::Error>(
                    "data: {\"choices\":[{\"text\":\"Hel\"}]}\n\n",
                )]);
                let broken = stream::once(async {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Err::<&'static str, _>(std::io::Error::new(
                        std::io::ErrorKind::ConnectionReset,
                        "relay crashed",
                    ))
                });
                Body::from_stream(first.chain(broken))
            }),
        );
        let c = client(serve(app).await);
        let us = run(&c, CancellationToken::new()).await;
        assert_eq!(us[0], TurnUpdate::Updated("Hel".into()));
        let (m, reason) = last_message(&us);
        assert!(m.text.starts_with("Hel\n\n(error) "), "got {:?}", m.text);
        assert!(matches!(reason, FinishReason::Failed(_)));
    }

    #[tokio::test]
    async fn end_of_body_without_sentinel_still_finalizes() {
        let app = Router::new().route(
            "/api/stream",
            post(|| async { "data: {\"choices\":[{\"text\":\"only\"}]}\n\n" }),
        );
        let c = client(serve(app).await);
        let us = run(&c, CancellationToken::new()).await;
        let (m, reason) = last_message(&us);
        assert_eq!(m.text, "only");
        assert_eq!(reason, FinishReason::EndOfStream);
    }

    #[tokio::test]
    async fn non_success_status_becomes_error_message() {
        let app = Router::new().route(
            "/api/stream",
            post(|| async { (AxumStatus::BAD_GATEWAY, "upstream down") }),
        );
        let c = client(serve(app).await);
        let us = run(&c, CancellationToken::new()).await;
        assert_eq!(us.len(), 1);
        let (m, reason) = last_message(&us);
        assert_eq!(m.text, "(error) Upstream error: 502 upstream down");
        assert!(matches!(reason, FinishReason::Failed(_)));
    }

    #[tokio::test]
    async fn unreachable_relay_becomes_error_message() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let c = client(format!("http://{}", addr));
        let us = run(&c, CancellationToken::new()).await;
        let (m, _) = last_message(&us);
        assert!(m.text.starts_with("(error) "));
    }

    #[tokio::test]
    async fn cancel_keeps_partial_text() {
        let app = Router::new().route(
            "/api/stream",
            post(|| async {
                let first = stream::once(async {
                    Ok::<_, Infallible>("data: {\"choices\":[{\"text\":\"part\"}]}\n\n".to_string())
                });
                let never = stream::pending::<Result<String, Infallible>>();
                Body::from_stream(first.chain(never))
            }),
        );
        let c = client(serve(app).await);
        let cancel = CancellationToken::new();
        let mut s = c.stream_turn(c.config().chat_request("Hi"), cancel.clone());
        assert_eq!(s.next().await, Some(TurnUpdate::Updated("part".into())));
        cancel.cancel();
        let rest: Vec<TurnUpdate> = s.collect().await;
        assert_eq!(rest.len(), 1);
        let (m, reason) = last_message(&rest);
        assert_eq!(m.text, "part");
        assert_eq!(reason, FinishReason::Canceled);
    }

    #[tokio::test]
    async fn complete_returns_json_and_forces_stream_off() {
        let app = Router::new().route(
            "/api/complete",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["stream"], false);
                Json(serde_json::json!({"choices":[{"text":"done"}], "model": body["model"]}))
            }),
        );
        let c = client(serve(app).await);
        let v = c.complete(&c.config().chat_request("Hi")).await.unwrap();
        assert_eq!(v["choices"][0]["text"], "done");
        assert_eq!(v["model"], "llama3.2:1b");
    }

    #[tokio::test]
    async fn complete_surfaces_error_status() {
        let app = Router::new().route(
            "/api/complete",
            post(|| async { (AxumStatus::BAD_GATEWAY, Json(serde_json::json!({"error":"x"}))) }),
        );
        let c = client(serve(app).await);
        let err = c.complete(&ChatRequest::new("Hi")).await.unwrap_err();
        assert!(matches!(err, ChatError::Status { status: 502, .. }));
    }
}
