use async_trait::async_trait;
use exam_core::model::{TestDefinition, TestId};
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use tracing::{debug, warn};

use crate::config::GatewayConfig;
use crate::repository::{
    AttemptSubmission, GatewayError, SubmissionAck, SubmissionGateway, TestCatalog,
};

mod mapping;

/// Header carrying the client attempt token so a retried submit is deduplicated.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Catalog and submission adapter for the exam REST API.
#[derive(Clone)]
pub struct HttpGateway {
    client: Client,
    base: Url,
    config: GatewayConfig,
}

impl HttpGateway {
    /// Build a client with the configured request timeout.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::InvalidUrl` if the base URL does not parse or
    /// cannot carry a path, and `GatewayError::Http` if the underlying client
    /// cannot be built.
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let base = Url::parse(&config.base_url)
            .map_err(|err| GatewayError::InvalidUrl(format!("{}: {err}", config.base_url)))?;
        if base.cannot_be_a_base() {
            return Err(GatewayError::InvalidUrl(config.base_url));
        }
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base,
            config,
        })
    }

    /// Build from `EXAM_API_*` environment variables, `None` when unconfigured.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Http` if the underlying client cannot be built.
    pub fn from_env() -> Result<Option<Self>, GatewayError> {
        GatewayConfig::from_env().map(Self::new).transpose()
    }

    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Append each segment to the base path, percent-encoding `/`, `?` and `#`.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| GatewayError::InvalidUrl(self.config.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl TestCatalog for HttpGateway {
    async fn fetch_test(&self, id: &TestId) -> Result<TestDefinition, GatewayError> {
        let url = self.endpoint(&["tests", id.as_str()])?;
        debug!(test_id = %id, %url, "fetching test");

        let response = self.authorize(self.client.get(url)).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(GatewayError::NotFound);
        }
        if !status.is_success() {
            warn!(test_id = %id, %status, "test fetch rejected");
            return Err(GatewayError::Status(status));
        }

        let body = response.text().await?;
        let test = mapping::parse_test(&body)?;
        if test.id != *id {
            warn!(test_id = %id, received = %test.id, "catalog answered for another test");
            return Err(GatewayError::Decode(format!(
                "requested test {id}, received {}",
                test.id
            )));
        }
        Ok(test)
    }
}

#[async_trait]
impl SubmissionGateway for HttpGateway {
    async fn submit_attempt(
        &self,
        submission: &AttemptSubmission,
    ) -> Result<SubmissionAck, GatewayError> {
        let url = self.endpoint(&["tests", "submit", submission.test_id.as_str()])?;
        let payload = mapping::submit_body(submission);
        debug!(
            test_id = %submission.test_id,
            attempt_id = %submission.attempt_id,
            time_spent = submission.time_spent_secs,
            "submitting attempt"
        );

        let response = self
            .authorize(self.client.post(url))
            .header(IDEMPOTENCY_HEADER, submission.attempt_id.to_string())
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(attempt_id = %submission.attempt_id, %status, "submission rejected");
            return Err(GatewayError::Status(status));
        }

        let body = response.text().await?;
        mapping::parse_ack(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config(base_url: &str) -> GatewayConfig {
        GatewayConfig {
            base_url: base_url.into(),
            api_token: None,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn gateway_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<HttpGateway>();
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        for base in ["http://localhost:8000/api/", "http://localhost:8000/api"] {
            let gateway = HttpGateway::new(config(base)).unwrap();
            assert_eq!(
                gateway.endpoint(&["tests", "t1"]).unwrap().as_str(),
                "http://localhost:8000/api/tests/t1"
            );
        }
    }

    #[test]
    fn endpoint_escapes_reserved_characters_in_ids() {
        let gateway = HttpGateway::new(config("http://localhost:8000/api")).unwrap();
        let cases = [
            ("gate#1", "http://localhost:8000/api/tests/gate%231"),
            ("gate?x=1", "http://localhost:8000/api/tests/gate%3Fx=1"),
            ("gate/1", "http://localhost:8000/api/tests/gate%2F1"),
        ];
        for (id, expected) in cases {
            let url = gateway.endpoint(&["tests", id]).unwrap();
            assert_eq!(url.as_str(), expected);
            assert_eq!(url.query(), None);
            assert_eq!(url.fragment(), None);
        }
    }

    #[test]
    fn unusable_base_url_is_rejected() {
        assert!(matches!(
            HttpGateway::new(config("not a url")),
            Err(GatewayError::InvalidUrl(_))
        ));
        assert!(matches!(
            HttpGateway::new(config("mailto:exams@example.com")),
            Err(GatewayError::InvalidUrl(_))
        ));
    }
}
