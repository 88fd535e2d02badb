use std::{fmt, future::Future};

use crate::{
    body::ResponseBody, ClientOptions, ConfigError, HttpRequest, ResponseEnvelope, TransportError,
};

/// Sends one request and returns the raw response.
///
/// Implementations must be safe to share between concurrent calls.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<ResponseEnvelope, TransportError>> + Send;
}

/// Transport backed by a pooled [`reqwest::Client`].
#[derive(Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestTransport").finish_non_exhaustive()
    }
}

impl ReqwestTransport {
    /// Builds a client with the configured connect, read and overall timeouts.
    pub fn new(options: &ClientOptions) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .connect_timeout(options.connect_timeout)
            .read_timeout(options.read_timeout)
            .timeout(options.request_timeout())
            .build()?;
        Ok(Self { http })
    }

    /// Wraps an existing client as-is.
    pub fn from_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<ResponseEnvelope, TransportError> {
        let mut builder = self
            .http
            .request(request.method, &request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().to_string();
        let body = if response.content_length() == Some(0) {
            ResponseBody::empty()
        } else {
            ResponseBody::streaming(response)
        };

        Ok(ResponseEnvelope::new(status, url, body).with_headers(headers))
    }
}
