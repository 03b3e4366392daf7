use crate::core::feeds::FetchError;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// Shared HTTP client for every feed endpoint and ESI lookup. JSON only.
pub struct JsonHttpClient {
    client: Client,
}

impl JsonHttpClient {
    pub fn new(contact: &str, timeout: Duration) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert("Accept", HeaderValue::from_static("application/json"));
        headers.insert(
            "User-Agent",
            HeaderValue::from_str(&format!("application: MercuryBot contact: {}", contact))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self { client })
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| request_error(url, e))?;

        read_json(url, resp).await
    }

    pub async fn post_json<B, T>(&self, url: &str, body: &B) -> Result<T, FetchError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let resp = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| request_error(url, e))?;

        read_json(url, resp).await
    }
}

async fn read_json<T: DeserializeOwned>(url: &str, resp: Response) -> Result<T, FetchError> {
    let status = resp.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            endpoint: url.to_string(),
            status: status.as_u16(),
        });
    }

    let body = resp.text().await.map_err(|e| request_error(url, e))?;
    parse_json(url, &body)
}

fn request_error(url: &str, err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout {
            endpoint: url.to_string(),
        }
    } else {
        FetchError::Network {
            endpoint: url.to_string(),
            message: err.to_string(),
        }
    }
}

/// Decode a response body, reporting failures against `endpoint`.
pub fn parse_json<T: DeserializeOwned>(endpoint: &str, body: &str) -> Result<T, FetchError> {
    serde_json::from_str(body).map_err(|e| FetchError::Malformed {
        endpoint: endpoint.to_string(),
        message: e.to_string(),
    })
}
