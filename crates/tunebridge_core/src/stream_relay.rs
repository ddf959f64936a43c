/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Stream relay: fetch an external audio URL and hand its bytes to the
//! caller as they arrive.
//!
//! The upstream body is moved through a bounded channel by a producer task,
//! so at most `RELAY_PIPE_CHUNKS` chunks sit in memory per session whatever
//! the file size. Dropping the [`RelayBody`] (client gone) closes the channel;
//! the producer notices, drops the upstream response and the socket with it.

use anyhow::{Context, Result};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::{header, redirect, Client as HttpClient};
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::RelayError;
use crate::upstream::UPSTREAM_TIMEOUT;

pub const RELAY_MAX_REDIRECTS: usize = 5;
pub const RELAY_PIPE_CHUNKS: usize = 16;
pub const DEFAULT_STREAM_CONTENT_TYPE: &str = "audio/mpeg";
pub const DEFAULT_STREAM_USER_AGENT: &str = "MusicWithMe/1.0";

/// Headers to put on the client-facing response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayHead {
    /// 206 when the upstream answered a range request, 200 otherwise.
    pub status: u16,
    pub content_type: String,
    pub content_length: Option<u64>,
    pub accept_ranges: Option<String>,
    pub content_range: Option<String>,
}

/// Consumer half of the relay pipe.
pub struct RelayBody {
    rx: mpsc::Receiver<Result<Bytes, std::io::Error>>,
}

impl Stream for RelayBody {
    type Item = Result<Bytes, std::io::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

pub struct RelayStream {
    pub head: RelayHead,
    pub body: RelayBody,
}

/// Validates the caller supplied, percent-encoded URL.
pub fn parse_stream_url(encoded: Option<&str>) -> Result<Url, RelayError> {
    let encoded = encoded
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(RelayError::MissingUrl)?;
    if !is_well_formed_percent(encoded) {
        return Err(RelayError::InvalidUrl);
    }
    let decoded = urlencoding::decode(encoded).map_err(|_| RelayError::InvalidUrl)?;
    if !has_http_scheme(&decoded) {
        return Err(RelayError::InvalidProtocol);
    }
    let url = Url::parse(&decoded).map_err(|_| RelayError::InvalidUrl)?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(RelayError::InvalidProtocol),
    }
}

fn has_http_scheme(s: &str) -> bool {
    let starts = |prefix: &str| {
        s.get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
    };
    starts("http://") || starts("https://")
}

fn is_well_formed_percent(s: &str) -> bool {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let ok = bytes.get(i + 1).is_some_and(u8::is_ascii_hexdigit)
                && bytes.get(i + 2).is_some_and(u8::is_ascii_hexdigit);
            if !ok {
                return false;
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    true
}

#[derive(Clone)]
pub struct StreamRelay {
    http: HttpClient,
}

impl StreamRelay {
    pub fn new(user_agent: &str) -> Result<Self> {
        let http = HttpClient::builder()
            .user_agent(user_agent)
            .redirect(redirect::Policy::limited(RELAY_MAX_REDIRECTS))
            .connect_timeout(UPSTREAM_TIMEOUT)
            .build()
            .context("build stream relay http client")?;
        Ok(Self { http })
    }

    /// Opens the upstream and returns once response headers are in.
    ///
    /// Errors returned here happen before any byte reached the caller, so
    /// they can still be turned into a JSON answer.
    pub async fn open(&self, encoded: Option<&str>, range: Option<&str>) -> Result<RelayStream, RelayError> {
        let url = parse_stream_url(encoded)?;
        let host = url.host_str().unwrap_or_default().to_string();

        let mut req = self.http.get(url);
        if let Some(range) = range {
            req = req.header(header::RANGE, range);
        }
        let resp = match tokio::time::timeout(UPSTREAM_TIMEOUT, req.send()).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => {
                warn!(host = %host, "stream upstream request failed: {}", e.without_url());
                return Err(RelayError::Upstream("stream failed".to_string()));
            }
            Err(_) => {
                warn!(host = %host, "stream upstream timed out");
                return Err(RelayError::Upstream("stream timed out".to_string()));
            }
        };

        let status = resp.status();
        if !status.is_success() {
            warn!(host = %host, status = status.as_u16(), "stream upstream rejected request");
            return Err(RelayError::UpstreamStatus(status.as_u16()));
        }

        let headers = resp.headers();
        let text = |name: header::HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        };
        let head = RelayHead {
            status: if status == reqwest::StatusCode::PARTIAL_CONTENT { 206 } else { 200 },
            content_type: text(header::CONTENT_TYPE)
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_STREAM_CONTENT_TYPE.to_string()),
            content_length: text(header::CONTENT_LENGTH).and_then(|s| s.parse::<u64>().ok()),
            accept_ranges: text(header::ACCEPT_RANGES),
            content_range: text(header::CONTENT_RANGE),
        };
        info!(host = %host, status = head.status, content_type = %head.content_type, length = ?head.content_length, "stream relay opened");

        let body = pipe(host, resp.bytes_stream());
        Ok(RelayStream { head, body })
    }
}

/// Spawns the producer side of the pipe and returns the consumer side.
pub fn pipe<S, E>(label: String, upstream: S) -> RelayBody
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let (tx, rx) = mpsc::channel(RELAY_PIPE_CHUNKS);
    tokio::spawn(async move {
        let mut upstream = Box::pin(upstream);
        let mut relayed: u64 = 0;
        loop {
            let next = tokio::select! {
                _ = tx.closed() => {
                    info!(host = %label, relayed, "stream client went away");
                    return;
                }
                next = upstream.next() => next,
            };
            match next {
                Some(Ok(chunk)) => {
                    relayed += chunk.len() as u64;
                    if tx.send(Ok(chunk)).await.is_err() {
                        info!(host = %label, relayed, "stream client went away");
                        return;
                    }
                }
                Some(Err(e)) => {
                    warn!(host = %label, relayed, "stream upstream broke mid-body: {e}");
                    let _ = tx.send(Err(std::io::Error::other(e.to_string()))).await;
                    return;
                }
                None => {
                    debug!(host = %label, relayed, "stream relay finished");
                    return;
                }
            }
        }
    });
    RelayBody { rx }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use httpmock::prelude::*;
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn encoded(url: &str) -> String {
        urlencoding::encode(url).into_owned()
    }

    #[test]
    fn rejects_missing_and_bad_urls() {
        assert_eq!(parse_stream_url(None), Err(RelayError::MissingUrl));
        assert_eq!(parse_stream_url(Some("  ")), Err(RelayError::MissingUrl));
        assert_eq!(parse_stream_url(Some("not-a-url")), Err(RelayError::InvalidProtocol));
        assert_eq!(
            parse_stream_url(Some(&encoded("ftp://host/file"))),
            Err(RelayError::InvalidProtocol)
        );
        assert_eq!(parse_stream_url(Some("ftp://host/file")), Err(RelayError::InvalidProtocol));
        assert_eq!(
            parse_stream_url(Some("javascript:alert(1)")),
            Err(RelayError::InvalidProtocol)
        );
        assert_eq!(parse_stream_url(Some("https%3A%2F%2Fhost%2F%E0%A4%A")), Err(RelayError::InvalidUrl));
        assert_eq!(parse_stream_url(Some("http://")), Err(RelayError::InvalidUrl));
    }

    #[test]
    fn accepts_encoded_and_plain_http_urls() {
        let url = parse_stream_url(Some(&encoded("https://cdn.example/a b.mp3?x=1"))).unwrap();
        assert_eq!(url.as_str(), "https://cdn.example/a%20b.mp3?x=1");
        let url = parse_stream_url(Some("HTTP://cdn.example/a.mp3")).unwrap();
        assert_eq!(url.scheme(), "http");
    }

    #[tokio::test]
    async fn invalid_urls_fail_before_any_request() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.any_request();
                then.status(200);
            })
            .await;
        let relay = StreamRelay::new(DEFAULT_STREAM_USER_AGENT).unwrap();
        let ftp = encoded(&format!("ftp://{}/file", server.address()));
        assert!(matches!(relay.open(Some(&ftp), None).await, Err(RelayError::InvalidProtocol)));
        assert!(matches!(relay.open(Some("not-a-url"), None).await, Err(RelayError::InvalidProtocol)));
        assert_eq!(mock.hits_async().await, 0);
    }

    #[tokio::test]
    async fn relays_large_body_with_headers() {
        let server = MockServer::start_async().await;
        let body: Vec<u8> = (0..10 * 1024 * 1024).map(|i| (i % 251) as u8).collect();
        let expected = body.clone();
        server
            .mock_async(move |when, then| {
                when.method(GET)
                    .path("/audio.mp3")
                    .header("user-agent", DEFAULT_STREAM_USER_AGENT);
                then.status(200)
                    .header("content-type", "audio/mpeg")
                    .header("accept-ranges", "bytes")
                    .body(body);
            })
            .await;

        let relay = StreamRelay::new(DEFAULT_STREAM_USER_AGENT).unwrap();
        let url = encoded(&server.url("/audio.mp3"));
        let RelayStream { head, mut body } = relay.open(Some(&url), None).await.unwrap();
        assert_eq!(head.status, 200);
        assert_eq!(head.content_type, "audio/mpeg");
        assert_eq!(head.accept_ranges.as_deref(), Some("bytes"));
        assert_eq!(head.content_length, Some(expected.len() as u64));

        let mut received = Vec::with_capacity(expected.len());
        let mut chunks = 0;
        while let Some(chunk) = body.next().await {
            received.extend_from_slice(&chunk.unwrap());
            chunks += 1;
        }
        assert!(chunks > 1, "body should arrive in several chunks");
        assert_eq!(received, expected);
    }

    #[tokio::test]
    async fn missing_content_type_defaults_to_audio() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/raw");
                then.status(200).body("abc");
            })
            .await;
        let relay = StreamRelay::new(DEFAULT_STREAM_USER_AGENT).unwrap();
        let stream = relay.open(Some(&encoded(&server.url("/raw"))), None).await.unwrap();
        assert_eq!(stream.head.content_type, DEFAULT_STREAM_CONTENT_TYPE);
    }

    #[tokio::test]
    async fn upstream_status_is_surfaced_before_streaming() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/gone.mp3");
                then.status(404).body("not here");
            })
            .await;
        let relay = StreamRelay::new(DEFAULT_STREAM_USER_AGENT).unwrap();
        let err = relay
            .open(Some(&encoded(&server.url("/gone.mp3"))), None)
            .await
            .err()
            .unwrap();
        assert_eq!(err, RelayError::UpstreamStatus(404));
    }

    #[tokio::test]
    async fn unreachable_upstream_is_a_fetch_failure() {
        let relay = StreamRelay::new(DEFAULT_STREAM_USER_AGENT).unwrap();
        let err = relay
            .open(Some(&encoded("http://127.0.0.1:1/a.mp3")), None)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, RelayError::Upstream(_)));
    }

    #[tokio::test]
    async fn range_requests_are_forwarded() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/a.mp3").header("range", "bytes=0-9");
                then.status(206)
                    .header("content-type", "audio/mpeg")
                    .header("content-range", "bytes 0-9/100")
                    .body("0123456789");
            })
            .await;
        let relay = StreamRelay::new(DEFAULT_STREAM_USER_AGENT).unwrap();
        let stream = relay
            .open(Some(&encoded(&server.url("/a.mp3"))), Some("bytes=0-9"))
            .await
            .unwrap();
        assert_eq!(stream.head.status, 206);
        assert_eq!(stream.head.content_range.as_deref(), Some("bytes 0-9/100"));
    }

    #[tokio::test]
    async fn redirects_are_followed() {
        let server = MockServer::start_async().await;
        let target = server.url("/final.mp3");
        server
            .mock_async(move |when, then| {
                when.method(GET).path("/moved.mp3");
                then.status(302).header("location", target.as_str());
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/final.mp3");
                then.status(200).header("content-type", "audio/ogg").body("ogg");
            })
            .await;
        let relay = StreamRelay::new(DEFAULT_STREAM_USER_AGENT).unwrap();
        let stream = relay
            .open(Some(&encoded(&server.url("/moved.mp3"))), None)
            .await
            .unwrap();
        assert_eq!(stream.head.content_type, "audio/ogg");
    }

    #[tokio::test]
    async fn mid_stream_error_terminates_the_body() {
        let upstream = stream::iter(vec![
            Ok(Bytes::from_static(b"first")),
            Err("connection reset"),
            Ok(Bytes::from_static(b"never")),
        ]);
        let mut body = pipe("test".to_string(), upstream);
        assert_eq!(body.next().await.unwrap().unwrap(), Bytes::from_static(b"first"));
        assert!(body.next().await.unwrap().is_err());
        assert!(body.next().await.is_none());
    }

    #[tokio::test]
    async fn dropping_the_body_releases_the_upstream() {
        let (guard, released) = oneshot::channel::<()>();
        let upstream = stream::unfold(guard, |guard| async move {
            Some((Ok::<_, std::io::Error>(Bytes::from_static(b"chunk")), guard))
        });
        let mut body = pipe("test".to_string(), upstream);
        assert!(body.next().await.is_some());
        drop(body);

        let dropped = tokio::time::timeout(Duration::from_secs(2), released).await;
        assert!(matches!(dropped, Ok(Err(_))), "upstream stream should be dropped");
    }
}
