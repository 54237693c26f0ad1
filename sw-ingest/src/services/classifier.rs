//! Species classifier client
//!
//! The model is hosted elsewhere; this module only knows the contract:
//! one image in, a ranked list of labels out.

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("sw-ingest/", env!("CARGO_PKG_VERSION"));

/// Labels kept per image
pub const TOP_K: usize = 3;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Image encode error: {0}")]
    Encode(String),

    #[error("Classifier timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    #[serde(default)]
    pub score: f64,
}

#[async_trait]
pub trait Classifier: Send + Sync {
    /// Ranked best first
    async fn classify(&self, image: &DynamicImage) -> Result<Vec<Prediction>, ClassifierError>;
}

/// Accepted response bodies: the inference API's `[{label, score}]`, or the
/// cetacean model's `{"predictions": ["label", ...]}`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClassifierResponse {
    Scored(Vec<Prediction>),
    Labels { predictions: Vec<String> },
}

impl ClassifierResponse {
    fn into_ranked(self) -> Vec<Prediction> {
        let mut ranked = match self {
            ClassifierResponse::Scored(mut predictions) => {
                predictions.sort_by(|a, b| b.score.total_cmp(&a.score));
                predictions
            }
            // Already ranked; no scores
            ClassifierResponse::Labels { predictions } => predictions
                .into_iter()
                .map(|label| Prediction { label, score: 0.0 })
                .collect(),
        };
        ranked.truncate(TOP_K);
        ranked
    }
}

/// HTTP inference endpoint client
pub struct HfClassifier {
    http_client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl HfClassifier {
    pub fn new(
        endpoint: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ClassifierError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| ClassifierError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: endpoint.into(),
            token,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, ClassifierError> {
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|e| ClassifierError::Encode(e.to_string()))?;
    Ok(out.into_inner())
}

#[async_trait]
impl Classifier for HfClassifier {
    async fn classify(&self, image: &DynamicImage) -> Result<Vec<Prediction>, ClassifierError> {
        let body = encode_png(image)?;
        tracing::debug!(
            endpoint = %self.endpoint,
            bytes = body.len(),
            "Sending image to classifier"
        );

        let mut request = self
            .http_client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "image/png")
            .body(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ClassifierError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifierError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ClassifierResponse = response
            .json()
            .await
            .map_err(|e| ClassifierError::Parse(e.to_string()))?;
        let ranked = parsed.into_ranked();

        if let Some(top) = ranked.first() {
            tracing::info!(label = %top.label, score = top.score, "Classification successful");
        }
        Ok(ranked)
    }
}
