//! Channel Request Issuer
//!
//! HTTP GET abstraction with chunked delivery: every partial chunk is
//! reported as it arrives, followed by exactly one terminal event. Dropping
//! the stream cancels the request.

use crate::core::channel::types::RequestFailure;
use futures::stream::BoxStream;
use std::collections::HashMap;
use url::Url;

#[cfg(feature = "network")]
use crate::core::channel::types::RequestErrorKind;
#[cfg(feature = "network")]
use futures::AsyncReadExt;
#[cfg(feature = "network")]
use isahc::{HttpClient, Request};

/// Back-channel delivery mode, sent as the `TYPE` query parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    /// Streaming-capable transport (`TYPE=xmlhttp`)
    XmlHttp,
    /// Non-streaming transport that delivers chunks as separate documents (`TYPE=html`)
    Html,
}

impl RequestMode {
    pub fn type_param(&self) -> &'static str {
        match self {
            RequestMode::XmlHttp => "xmlhttp",
            RequestMode::Html => "html",
        }
    }
}

/// A GET request issued by the test channel
#[derive(Debug, Clone)]
pub struct ChannelRequest {
    /// Complete URI including query parameters
    pub url: Url,
    /// Extra headers to send with the request
    pub headers: HashMap<String, String>,
    pub mode: RequestMode,
}

/// One delivery from an in-flight request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseEvent {
    /// A chunk of response text, in arrival order
    Data(String),
    /// The response finished successfully; nothing follows
    Complete { status_code: u16 },
    /// The request failed; nothing follows
    Failed(RequestFailure),
}

/// Stream of response deliveries; a stream that ends without a terminal
/// event is treated as a transport failure
pub type ResponseStream = BoxStream<'static, ResponseEvent>;

/// HTTP request issuer for dependency injection and testing
#[async_trait::async_trait]
pub trait ChannelRequester: Send + Sync {
    /// Issue a GET and stream its deliveries
    ///
    /// # Implementation Requirements
    /// * Must not buffer the body: each chunk is yielded as soon as it is read
    /// * Non-2xx statuses end the stream with `ResponseEvent::Failed`
    /// * Dropping the returned stream must cancel the request
    async fn get(&self, request: ChannelRequest) -> ResponseStream;
}

/// Production request issuer using isahc
#[cfg(feature = "network")]
#[derive(Clone)]
pub struct IsahcChannelRequester {
    client: HttpClient,
}

#[cfg(feature = "network")]
impl IsahcChannelRequester {
    pub fn new() -> Result<Self, isahc::Error> {
        Ok(Self {
            client: HttpClient::new()?,
        })
    }
}

#[cfg(feature = "network")]
enum ReadState {
    Start(HttpClient, ChannelRequest),
    Reading(isahc::AsyncBody, u16),
    Done,
}

#[cfg(feature = "network")]
fn classify_isahc_error(error: &isahc::Error) -> RequestErrorKind {
    match error.kind() {
        isahc::error::ErrorKind::Timeout => RequestErrorKind::Timeout,
        _ => RequestErrorKind::Status,
    }
}

#[cfg(feature = "network")]
async fn read_chunk(mut body: isahc::AsyncBody, status_code: u16) -> (ResponseEvent, ReadState) {
    let mut buf = vec![0u8; 8 * 1024];
    match body.read(&mut buf).await {
        Ok(0) => (ResponseEvent::Complete { status_code }, ReadState::Done),
        Ok(n) => (
            ResponseEvent::Data(String::from_utf8_lossy(&buf[..n]).into_owned()),
            ReadState::Reading(body, status_code),
        ),
        Err(e) => {
            let kind = if e.kind() == std::io::ErrorKind::TimedOut {
                RequestErrorKind::Timeout
            } else {
                RequestErrorKind::Status
            };
            (
                ResponseEvent::Failed(RequestFailure::new(
                    kind,
                    Some(status_code),
                    format!("Failed to read response body: {}", e),
                )),
                ReadState::Done,
            )
        }
    }
}

#[cfg(feature = "network")]
async fn start_request(client: HttpClient, request: ChannelRequest) -> (ResponseEvent, ReadState) {
    let mut builder = Request::get(request.url.as_str());
    for (key, value) in &request.headers {
        builder = builder.header(key.as_str(), value.as_str());
    }

    let http_request = match builder.body(()) {
        Ok(req) => req,
        Err(e) => {
            return (
                ResponseEvent::Failed(RequestFailure::new(
                    RequestErrorKind::Status,
                    None,
                    format!("Request creation failed: {}", e),
                )),
                ReadState::Done,
            )
        }
    };

    let response = match client.send_async(http_request).await {
        Ok(response) => response,
        Err(e) => {
            return (
                ResponseEvent::Failed(RequestFailure::new(
                    classify_isahc_error(&e),
                    None,
                    format!("Request failed: {}", e),
                )),
                ReadState::Done,
            )
        }
    };

    let status_code = response.status().as_u16();
    if !(200..300).contains(&status_code) {
        return (
            ResponseEvent::Failed(RequestFailure::new(
                RequestErrorKind::Status,
                Some(status_code),
                format!("Unexpected HTTP status {}", status_code),
            )),
            ReadState::Done,
        );
    }

    read_chunk(response.into_body(), status_code).await
}

#[cfg(feature = "network")]
#[async_trait::async_trait]
impl ChannelRequester for IsahcChannelRequester {
    async fn get(&self, request: ChannelRequest) -> ResponseStream {
        let initial = ReadState::Start(self.client.clone(), request);
        let stream = futures::stream::unfold(initial, |state| async move {
            let (event, next) = match state {
                ReadState::Start(client, request) => start_request(client, request).await,
                ReadState::Reading(body, status_code) => read_chunk(body, status_code).await,
                ReadState::Done => return None,
            };
            Some((event, next))
        });
        Box::pin(stream)
    }
}
