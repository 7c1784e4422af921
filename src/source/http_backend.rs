use super::{filter_candidates, FetchRequest, MediaSource};
use crate::config::SourceConfig;
use crate::error::{Error, Result};
use crate::meta::MediaCandidate;
use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Client for an HTTP media feed serving `GET /users/{name}/media`.
pub struct HttpSource {
    client: Client,
    base_url: Url,
    retries: usize,
}

impl HttpSource {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let base_url = Url::parse(&config.url)?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!(
                "Invalid media feed URL: {}",
                config.url
            )));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(&config.user_agent)
            .build()?;
        Ok(Self {
            client,
            base_url,
            retries: 2,
        })
    }

    fn endpoint(&self, user_name: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("Invalid media feed URL: {}", self.base_url)))?
            .pop_if_empty()
            .extend(["users", user_name, "media"]);
        Ok(url)
    }

    async fn send_with_retry(&self, request: reqwest::RequestBuilder) -> Result<Vec<MediaCandidate>> {
        let mut last_err: Option<Error> = None;
        for attempt in 0..=self.retries {
            let req = request
                .try_clone()
                .ok_or_else(|| Error::Source("Failed to clone feed request".to_string()))?;
            match req.send().await {
                Ok(response) => match response.error_for_status() {
                    Ok(ok) => return Ok(ok.json::<Vec<MediaCandidate>>().await?),
                    // Client errors will not improve on retry
                    Err(e) if e.status().is_some_and(|s| s.is_client_error()) => {
                        return Err(Error::Source(e.to_string()));
                    }
                    Err(e) => last_err = Some(Error::Source(e.to_string())),
                },
                Err(e) => last_err = Some(Error::Source(e.to_string())),
            }

            if attempt < self.retries {
                tokio::time::sleep(Duration::from_millis(200 * (attempt + 1) as u64)).await;
            }
        }

        Err(last_err.unwrap_or_else(|| Error::Source("Media feed request failed".to_string())))
    }
}

#[async_trait]
impl MediaSource for HttpSource {
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<MediaCandidate>> {
        let url = self.endpoint(&request.user_name)?;
        let mut query = vec![("limit", request.limit.to_string())];
        if let Some(since) = request.since {
            query.push(("since", since.to_rfc3339_opts(SecondsFormat::Micros, true)));
        }

        debug!(%url, user_name = %request.user_name, "Fetching media feed");
        let listing = self.send_with_retry(self.client.get(url).query(&query)).await?;
        Ok(filter_candidates(listing, request))
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source_for(server: &MockServer) -> HttpSource {
        let config = SourceConfig {
            url: server.uri(),
            timeout_secs: 5,
            ..SourceConfig::default()
        };
        HttpSource::new(&config).expect("source should build")
    }

    #[tokio::test]
    async fn test_fetch_passes_limit_and_since() {
        let server = MockServer::start().await;
        let body = serde_json::json!([
            {"user_id": "7", "user_name": "alice", "resource_id": "r1", "resource_url": "https://cdn/r1"},
            {"user_id": "7", "user_name": "alice", "resource_id": "r2", "resource_url": "https://cdn/r2"}
        ]);

        Mock::given(method("GET"))
            .and(path("/users/alice/media"))
            .and(query_param("limit", "5"))
            .and(query_param("since", "2024-01-01T00:00:00.000000Z"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(1)
            .mount(&server)
            .await;

        let request = FetchRequest {
            user_name: "alice".to_string(),
            since: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            limit: 5,
        };
        let items = source_for(&server).fetch(&request).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].resource_id, "r1");
    }

    #[tokio::test]
    async fn test_user_name_is_path_escaped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/a%20b/media"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let request = FetchRequest {
            user_name: "a b".to_string(),
            since: None,
            limit: 20,
        };
        assert!(source_for(&server).fetch(&request).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let server = MockServer::start().await;
        let guard = Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount_as_scoped(&server)
            .await;

        let request = FetchRequest {
            user_name: "ghost".to_string(),
            since: None,
            limit: 20,
        };
        let err = source_for(&server).fetch(&request).await.unwrap_err();
        assert!(matches!(err, Error::Source(_)));
        assert_eq!(guard.received_requests().await.len(), 1);
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let server = MockServer::start().await;
        let guard = Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount_as_scoped(&server)
            .await;

        let request = FetchRequest {
            user_name: "alice".to_string(),
            since: None,
            limit: 20,
        };
        assert!(source_for(&server).fetch(&request).await.is_err());
        assert_eq!(guard.received_requests().await.len(), 3);
    }
}
