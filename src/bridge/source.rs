//! Where readings come from.

use super::reading::Reading;
use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use log::debug;

/// Path appended to the configured base URL.
pub const SENSORS_PATH: &str = "/sensors/tphb";

/// A source of sensor readings, polled by the bridge.
///
/// One call is one poll attempt; retries are the caller's business.
#[async_trait]
pub trait ReadingSource: Send + Sync + 'static {
    async fn fetch(&self) -> Result<Reading>;

    /// Human-readable location, for logs.
    fn describe(&self) -> String;
}

/// Reads `GET {api_url}/sensors/tphb`.
///
/// No auth headers and no explicit request timeout; the client defaults apply.
pub struct HttpReadingSource {
    client: reqwest::Client,
    url: String,
}

impl HttpReadingSource {
    pub fn new(api_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self::with_client(client, api_url))
    }

    /// Share one client (and its connection pool) across sources.
    pub fn with_client(client: reqwest::Client, api_url: &str) -> Self {
        Self {
            client,
            url: format!("{}{}", api_url, SENSORS_PATH),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ReadingSource for HttpReadingSource {
    async fn fetch(&self) -> Result<Reading> {
        debug!("[Bridge] GET {}", self.url);
        let resp = self.client.get(&self.url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(BridgeError::HttpStatus(status.as_u16()));
        }

        let body = resp.bytes().await?;
        Reading::from_slice(&body)
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_url_is_base_plus_path() {
        let source = HttpReadingSource::new("http://10.0.0.5:8080").unwrap();
        assert_eq!(source.url(), "http://10.0.0.5:8080/sensors/tphb");
        assert_eq!(source.describe(), source.url());
    }

    #[tokio::test]
    async fn test_fetch_decodes_reading() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sensors/tphb"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "tempe": 23.4, "humi": 55.2, "bright": 310
            })))
            .expect(1)
            .mount(&server)
            .await;

        let source = HttpReadingSource::new(&server.uri()).unwrap();
        let reading = source.fetch().await.unwrap();
        assert_eq!(
            reading,
            Reading {
                temperature: 23.4,
                humidity: 55.2,
                brightness: 310.0
            }
        );
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sensors/tphb"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let source = HttpReadingSource::new(&server.uri()).unwrap();
        let err = source.fetch().await.unwrap_err();
        assert!(matches!(err, BridgeError::HttpStatus(503)));
    }

    #[tokio::test]
    async fn test_malformed_body_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sensors/tphb"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let source = HttpReadingSource::new(&server.uri()).unwrap();
        assert!(matches!(
            source.fetch().await.unwrap_err(),
            BridgeError::Decode(_)
        ));
    }

    #[tokio::test]
    async fn test_connection_refused_is_error() {
        // Nothing listens on port 9 (discard) in the test environment.
        let source = HttpReadingSource::new("http://127.0.0.1:9").unwrap();
        assert!(matches!(
            source.fetch().await.unwrap_err(),
            BridgeError::Http(_)
        ));
    }

    #[tokio::test]
    async fn test_invalid_base_url_is_error() {
        // An unset api_url produces a relative URL, which fails at request time.
        let source = HttpReadingSource::new("").unwrap();
        assert!(source.fetch().await.is_err());
    }
}
