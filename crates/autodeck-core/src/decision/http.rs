//! JSON-over-HTTP decision service

use super::{DecisionError, DecisionRequest, DecisionResponse, DecisionService};
use async_trait::async_trait;
use std::time::Duration;

/// Posts the decision request as JSON and reads `{ index, rationale }` back
///
/// `ureq` is blocking, so each call runs on tokio's blocking pool. The HTTP
/// timeout only bounds the socket; the session applies its own deadline.
#[derive(Debug, Clone)]
pub struct HttpDecisionService {
    endpoint: String,
    timeout: Duration,
}

impl HttpDecisionService {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl DecisionService for HttpDecisionService {
    async fn propose(&self, request: &DecisionRequest) -> Result<DecisionResponse, DecisionError> {
        let endpoint = self.endpoint.clone();
        let timeout = self.timeout;
        let body = serde_json::to_value(request)
            .map_err(|e| DecisionError::Service(format!("Failed to encode request: {}", e)))?;

        let joined = tokio::task::spawn_blocking(move || {
            let response = ureq::post(&endpoint)
                .timeout(timeout)
                .send_json(body)
                .map_err(|e| DecisionError::Service(format!("Request to {} failed: {}", endpoint, e)))?;

            response
                .into_json::<DecisionResponse>()
                .map_err(|e| DecisionError::Service(format!("Invalid response from {}: {}", endpoint, e)))
        })
        .await;

        match joined {
            Ok(result) => {
                if let Ok(response) = &result {
                    log::debug!(
                        "HttpDecisionService: picked {} ({})",
                        response.index,
                        response.rationale
                    );
                }
                result
            }
            Err(e) => Err(DecisionError::Service(format!("Decision task failed: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::music::HarmonicKey;

    #[tokio::test]
    async fn test_unreachable_endpoint_is_service_error() {
        // Port 9 (discard) is essentially never served locally
        let service = HttpDecisionService::new("http://127.0.0.1:9/decide", Duration::from_secs(2));
        let request = DecisionRequest {
            active_key: HarmonicKey::major(3),
            active_bpm: 122.0,
            energy: 0.5,
            tracks_played: 0,
            shortlist: Vec::new(),
        };
        let result = service.propose(&request).await;
        assert!(matches!(result, Err(DecisionError::Service(_))));
    }
}
