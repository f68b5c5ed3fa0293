use crate::config::{ApiKey, RewardConfig};
use crate::models::{RewardAttribute, RewardScoreSet};
use anyhow::{Context, Result};
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequest,
    CreateChatCompletionRequestArgs, CreateChatCompletionResponse,
};
use async_openai::{Client, config::OpenAIConfig};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Why a reward payload could not be turned into a full score set
#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("payload is empty")]
    Empty,
    #[error("item {0:?} is not a single key:value pair")]
    MalformedItem(String),
    #[error("unknown attribute {0:?}")]
    UnknownAttribute(String),
    #[error("attribute {0} appears more than once")]
    DuplicateAttribute(RewardAttribute),
    #[error("attribute {0} is missing")]
    MissingAttribute(RewardAttribute),
    #[error("value {value:?} for {attribute} is not a number")]
    InvalidValue {
        attribute: RewardAttribute,
        value: String,
    },
}

/// Why a single reward request produced no scores
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("question and answer must both be non-empty")]
    EmptyInput,
    #[error("reward request failed: {0}")]
    Request(#[from] OpenAIError),
    #[error("reward request timed out after {0:?}")]
    Timeout(Duration),
    #[error("reward response had no content")]
    EmptyResponse,
    #[error("malformed reward payload: {0}")]
    Parse(#[from] ParseError),
}

/// Result of one dispatch; absence carries the reason
#[derive(Debug)]
pub enum ScoreOutcome {
    Scored(RewardScoreSet),
    Absent(DispatchError),
}

/// Anything that can score a question/answer pair
#[async_trait]
pub trait RewardScorer: Send + Sync {
    async fn score(&self, question: &str, answer: &str) -> Result<RewardScoreSet, DispatchError>;

    /// Score a pair without propagating failures; they are logged and
    /// reported as `ScoreOutcome::Absent`
    async fn dispatch(&self, question: &str, answer: &str) -> ScoreOutcome {
        match self.score(question, answer).await {
            Ok(scores) => ScoreOutcome::Scored(scores),
            Err(err) => {
                tracing::warn!(question, error = %err, "Reward scoring failed");
                ScoreOutcome::Absent(err)
            }
        }
    }
}

/// Client for the remote reward model
pub struct RewardDispatcher {
    client: Client<OpenAIConfig>,
    model: String,
    timeout: Duration,
}

impl RewardDispatcher {
    /// Create a dispatcher for the configured endpoint using an already validated key
    pub fn new(config: &RewardConfig, api_key: ApiKey) -> Result<Self> {
        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key.expose())
            .with_api_base(&config.api_endpoint);

        let http_client = reqwest::Client::builder()
            .connect_timeout(config.timeout())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client: Client::with_config(openai_config).with_http_client(http_client),
            model: config.model.clone(),
            timeout: config.timeout(),
        })
    }

    /// Build the two-turn exchange the reward model scores
    fn build_request(
        &self,
        question: &str,
        answer: &str,
    ) -> Result<CreateChatCompletionRequest, OpenAIError> {
        let user_message: ChatCompletionRequestMessage =
            ChatCompletionRequestUserMessageArgs::default()
                .content(question.to_string())
                .build()?
                .into();

        let assistant_message: ChatCompletionRequestMessage =
            ChatCompletionRequestAssistantMessageArgs::default()
                .content(answer.to_string())
                .build()?
                .into();

        CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages([user_message, assistant_message])
            .build()
    }

    fn extract_content(response: CreateChatCompletionResponse) -> Option<String> {
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
    }
}

#[async_trait]
impl RewardScorer for RewardDispatcher {
    async fn score(&self, question: &str, answer: &str) -> Result<RewardScoreSet, DispatchError> {
        if question.trim().is_empty() || answer.trim().is_empty() {
            return Err(DispatchError::EmptyInput);
        }

        let request = self.build_request(question, answer)?;
        tracing::debug!(model = %self.model, question, "Sending reward request");

        let response = tokio::time::timeout(self.timeout, self.client.chat().create(request))
            .await
            .map_err(|_| DispatchError::Timeout(self.timeout))??;

        let content = Self::extract_content(response).ok_or(DispatchError::EmptyResponse)?;
        Ok(parse_reward_payload(&content)?)
    }
}

/// Parse a `key:value,key:value` payload into a complete score set.
///
/// Keys are matched case-insensitively. Every attribute must appear exactly
/// once with a finite numeric value, otherwise nothing is returned.
pub fn parse_reward_payload(payload: &str) -> Result<RewardScoreSet, ParseError> {
    let payload = payload.trim();
    if payload.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut values: [Option<f64>; 5] = [None; 5];
    for item in payload.split(',') {
        let mut parts = item.split(':');
        let (key, raw_value) = match (parts.next(), parts.next(), parts.next()) {
            (Some(key), Some(value), None) => (key.trim(), value.trim()),
            _ => return Err(ParseError::MalformedItem(item.trim().to_string())),
        };

        let attribute = RewardAttribute::from_key(key)
            .ok_or_else(|| ParseError::UnknownAttribute(key.to_string()))?;

        let value = raw_value
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .ok_or_else(|| ParseError::InvalidValue {
                attribute,
                value: raw_value.to_string(),
            })?;

        if values[attribute.index()].replace(value).is_some() {
            return Err(ParseError::DuplicateAttribute(attribute));
        }
    }

    let mut scores = [0.0; 5];
    for attribute in RewardAttribute::ALL {
        scores[attribute.index()] =
            values[attribute.index()].ok_or(ParseError::MissingAttribute(attribute))?;
    }
    Ok(RewardScoreSet::new(scores))
}
