//! The origin-fetch capability consumed by the engine
//!
//! The engine only needs "perform a GET, hand back status plus a byte
//! stream". Keeping that behind the [`Origin`] and [`Body`] traits lets the
//! tests substitute counting doubles for the network, and keeps redirects,
//! TLS and header plumbing out of the fetch logic itself.

use crate::error::FetchError;
use backsource_types::TlsOptions;
use bytes::Bytes;
use reqwest::{Certificate, Client, Response};
use std::collections::HashMap;
use std::time::Duration;

/// Issues a single full-body GET against a source URL.
#[allow(async_fn_in_trait)]
pub trait Origin {
    type Body: Body;

    /// Perform the GET and return the response status code together with the
    /// unread body. The body is returned even for non-success statuses so the
    /// caller can close it.
    async fn get(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> Result<(u16, Self::Body), FetchError>;
}

/// An unread response body: a pull-based chunk stream plus an explicit close.
///
/// `close` must be safe to call after the stream is exhausted; the engine
/// guarantees it is invoked at most once per body.
#[allow(async_fn_in_trait)]
pub trait Body {
    /// Next chunk of the body, `None` at end-of-stream.
    async fn chunk(&mut self) -> Result<Option<Bytes>, FetchError>;

    /// Release the underlying connection.
    fn close(&mut self) -> Result<(), FetchError>;
}

/// Production [`Origin`] backed by a reqwest [`Client`].
pub struct HttpOrigin {
    client: Client,
}

impl HttpOrigin {
    /// Build a client honoring the caller-supplied TLS settings.
    pub fn new(tls: &TlsOptions) -> Result<Self, FetchError> {
        let mut builder = Client::builder()
            .user_agent(concat!("backsource/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30));

        if tls.insecure {
            builder = builder.danger_accept_invalid_certs(true);
        }
        for path in &tls.ca_certs {
            let pem = std::fs::read(path)?;
            builder = builder.add_root_certificate(Certificate::from_pem(&pem)?);
        }

        Ok(Self {
            client: builder.build()?,
        })
    }
}

impl Origin for HttpOrigin {
    type Body = HttpBody;

    async fn get(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> Result<(u16, HttpBody), FetchError> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(name, value);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        Ok((
            status,
            HttpBody {
                response: Some(response),
            },
        ))
    }
}

/// Response body whose close drops the connection.
pub struct HttpBody {
    response: Option<Response>,
}

impl Body for HttpBody {
    async fn chunk(&mut self) -> Result<Option<Bytes>, FetchError> {
        match self.response.as_mut() {
            Some(response) => Ok(response.chunk().await?),
            None => Ok(None),
        }
    }

    fn close(&mut self) -> Result<(), FetchError> {
        self.response.take();
        Ok(())
    }
}
