use std::time::Duration;

use reqwest::blocking::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;

use localrag_core::{Capability, Error, Result};

/// Blocking JSON client bound to one capability, so failures map to that
/// capability's error kind.
pub(crate) struct JsonClient {
    client: Client,
    base_url: String,
    timeout: Duration,
    capability: Capability,
}

impl JsonClient {
    pub(crate) fn new(base_url: &str, timeout: Duration, capability: Capability) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::InvalidConfiguration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string(), timeout, capability })
    }

    fn failure(&self, msg: String) -> Error {
        match self.capability {
            Capability::Embedder => Error::Embedding(msg),
            Capability::Generator => Error::Generation(msg),
            Capability::VectorIndex => Error::Backend(msg),
        }
    }

    fn classify(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            return Error::CapabilityTimeout { capability: self.capability, timeout: self.timeout };
        }
        if e.is_connect() {
            return self.failure(format!("{} unreachable at {}: {e}", self.capability, self.base_url));
        }
        self.failure(format!("request failed: {e}"))
    }

    pub(crate) fn post<B: Serialize, R: DeserializeOwned>(&self, path: &str, body: &B) -> Result<R> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.post(&url).json(body).send().map_err(|e| self.classify(e))?;
        self.decode(response)
    }

    fn decode<R: DeserializeOwned>(&self, response: Response) -> Result<R> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_else(|_| "unable to read response body".to_string());
            return Err(self.failure(format!("{} returned {status}: {body}", self.capability)));
        }
        response.json().map_err(|e| {
            if e.is_timeout() {
                self.classify(e)
            } else {
                self.failure(format!("failed to parse response: {e}"))
            }
        })
    }
}
