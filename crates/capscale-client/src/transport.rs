//! Minimal HTTP/1.1 client over hyper's connection API.
//!
//! One connection per request: TCP (plus rustls for `https`), handshake,
//! send, collect the body. Every request is bounded by the configured
//! timeout. No pooling and no retries; the control loop runs hourly and
//! retry policy belongs to the caller.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderValue};
use http::{Method, Request, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

use crate::error::{ClientError, ClientResult};

const USER_AGENT: &str = concat!("capscale/", env!("CARGO_PKG_VERSION"));

/// A fully-read response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> ClientResult<T> {
        serde_json::from_slice(&self.body).map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// Turn any non-2xx status into `ClientError::Status`.
    pub fn error_for_status(self) -> ClientResult<Self> {
        if self.status.is_success() {
            Ok(self)
        } else {
            Err(ClientError::Status {
                status: self.status,
                body: truncate(&self.text(), 256),
            })
        }
    }
}

/// Client bound to one base URL.
#[derive(Clone)]
pub struct HttpClient {
    host: String,
    port: u16,
    base_path: String,
    tls: Option<Arc<rustls::ClientConfig>>,
    bearer: Option<String>,
    timeout: Duration,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("base_path", &self.base_path)
            .field("tls", &self.tls.is_some())
            .field("bearer", &self.bearer.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl HttpClient {
    /// Parse `base_url` (`http://` or `https://`, optional port and path prefix).
    pub fn new(base_url: &str, bearer: Option<String>, timeout: Duration) -> ClientResult<Self> {
        let invalid = |reason: &str| ClientError::InvalidUrl {
            url: base_url.to_string(),
            reason: reason.to_string(),
        };
        let uri: Uri = base_url.parse().map_err(|_| invalid("unparsable"))?;
        let secure = match uri.scheme_str() {
            Some("https") => true,
            Some("http") => false,
            _ => return Err(invalid("scheme must be http or https")),
        };
        let host = uri.host().ok_or_else(|| invalid("missing host"))?.to_string();
        let port = uri.port_u16().unwrap_or(if secure { 443 } else { 80 });
        let base_path = uri.path().trim_end_matches('/').to_string();

        let tls = if secure { Some(tls_config()?) } else { None };

        Ok(Self {
            host,
            port,
            base_path,
            tls,
            bearer,
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn get(&self, path: &str) -> ClientResult<HttpResponse> {
        self.send(Method::GET, path, None).await
    }

    pub async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> ClientResult<HttpResponse> {
        let bytes = serde_json::to_vec(body).map_err(|e| ClientError::Request(e.to_string()))?;
        self.send(Method::POST, path, Some(bytes)).await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> ClientResult<HttpResponse> {
        let target = format!("{}{}", self.base_path, path);
        let mut builder = Request::builder()
            .method(method.clone())
            .uri(target.as_str())
            .header(header::HOST, self.host_header())
            .header(header::USER_AGENT, USER_AGENT)
            .header(header::ACCEPT, "*/*");
        if let Some(token) = &self.bearer {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| ClientError::Request(e.to_string()))?;
            builder = builder.header(header::AUTHORIZATION, value);
        }
        if body.is_some() {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
        }
        let request = builder
            .body(Full::new(Bytes::from(body.unwrap_or_default())))
            .map_err(|e| ClientError::Request(e.to_string()))?;

        let response = tokio::time::timeout(self.timeout, self.exchange(request))
            .await
            .map_err(|_| ClientError::Timeout(self.timeout))??;
        debug!(%method, %target, status = %response.status, "http request complete");
        Ok(response)
    }

    async fn exchange(&self, request: Request<Full<Bytes>>) -> ClientResult<HttpResponse> {
        let tcp = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| ClientError::Connect(format!("{}:{}: {e}", self.host, self.port)))?;

        match &self.tls {
            Some(config) => {
                let name = ServerName::try_from(self.host.clone())
                    .map_err(|e| ClientError::Connect(format!("invalid server name: {e}")))?;
                let stream = TlsConnector::from(config.clone())
                    .connect(name, tcp)
                    .await
                    .map_err(|e| ClientError::Connect(format!("tls handshake: {e}")))?;
                roundtrip(TokioIo::new(stream), request).await
            }
            None => roundtrip(TokioIo::new(tcp), request).await,
        }
    }

    fn host_header(&self) -> String {
        let default_port = if self.tls.is_some() { 443 } else { 80 };
        if self.port == default_port {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

async fn roundtrip<T>(io: T, request: Request<Full<Bytes>>) -> ClientResult<HttpResponse>
where
    T: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
{
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "http connection closed with error");
        }
    });

    let response = sender.send_request(request).await?;
    let (parts, body) = response.into_parts();
    let body = body.collect().await?.to_bytes();
    Ok(HttpResponse {
        status: parts.status,
        headers: parts.headers,
        body,
    })
}

/// Mozilla roots via webpki-roots, ring provider.
fn tls_config() -> ClientResult<Arc<rustls::ClientConfig>> {
    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder_with_provider(
        rustls::crypto::ring::default_provider().into(),
    )
    .with_safe_default_protocol_versions()
    .map_err(|e| ClientError::Tls(format!("tls protocol version error: {e}")))?
    .with_root_certificates(root_store)
    .with_no_client_auth();

    Ok(Arc::new(config))
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::serve;

    #[test]
    fn parses_base_urls() {
        let client = HttpClient::new("https://saas-api.example.com", None, Duration::from_secs(5))
            .unwrap();
        assert_eq!(client.port, 443);
        assert!(client.tls.is_some());
        assert_eq!(client.host_header(), "saas-api.example.com");

        let client =
            HttpClient::new("http://127.0.0.1:8080/prefix/", None, Duration::from_secs(5)).unwrap();
        assert_eq!(client.port, 8080);
        assert_eq!(client.base_path, "/prefix");
        assert_eq!(client.host_header(), "127.0.0.1:8080");
    }

    #[test]
    fn rejects_bad_base_urls() {
        for url in ["ftp://example.com", "not a url", "/relative/only"] {
            let err = HttpClient::new(url, None, Duration::from_secs(1)).unwrap_err();
            assert!(matches!(err, ClientError::InvalidUrl { .. }), "{url}: {err}");
        }
    }

    #[test]
    fn debug_redacts_token() {
        let client = HttpClient::new(
            "http://localhost",
            Some("secret-token".into()),
            Duration::from_secs(1),
        )
        .unwrap();
        let rendered = format!("{client:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("<redacted>"));
    }

    #[tokio::test]
    async fn sends_bearer_and_reads_body() {
        let (base, server) = serve(vec![
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nX-Test: yes\r\nContent-Length: 5\r\n\r\nhello"
                .to_string(),
        ])
        .await;
        let client = HttpClient::new(&base, Some("tok".into()), Duration::from_secs(5)).unwrap();

        let resp = client.get("/ping").await.unwrap();
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.header("x-test"), Some("yes"));
        assert_eq!(resp.text(), "hello");

        let requests = server.await.unwrap();
        assert!(requests[0].starts_with("GET /ping HTTP/1.1"));
        assert!(requests[0].to_lowercase().contains("authorization: bearer tok"));
    }

    #[tokio::test]
    async fn error_for_status_keeps_body() {
        let (base, _server) = serve(vec![
            "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 4\r\n\r\ndown".to_string(),
        ])
        .await;
        let client = HttpClient::new(&base, None, Duration::from_secs(5)).unwrap();

        let err = client.get("/").await.unwrap().error_for_status().unwrap_err();
        match err {
            ClientError::Status { status, body } => {
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(body, "down");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn connect_failure_is_reported() {
        // Bind then drop to get a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client =
            HttpClient::new(&format!("http://{addr}"), None, Duration::from_secs(2)).unwrap();
        let err = client.get("/").await.unwrap_err();
        assert!(matches!(err, ClientError::Connect(_)));
    }

    #[test]
    fn truncate_long_bodies() {
        assert_eq!(truncate("abc", 10), "abc");
        assert_eq!(truncate("abcdef", 3), "abc...");
    }
}
