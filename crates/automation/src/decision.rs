//! The decision module: a secondary, model-backed judgement for escalated
//! task outcomes, with a deterministic fallback whenever it is unavailable.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use starbot_core::message::Message;
use starbot_core::provider::{Provider, ProviderRequest};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::escalation::DecisionInput;

/// System prompt for the decision model.
pub const DECISION_PROMPT: &str = r#"You are a conservative, deterministic decision analysis module.
Your only job is to compress complexity when rules are insufficient.

Rules:
- Output JSON only.
- Do not output natural language explanations.
- Do not change task goals.
- Do not predict the future.
- Do not provide human advice.

You will receive a structured event payload that was already filtered by program logic.
Return this schema exactly:
{
  "task_id": "string",
  "event_type": "string",
  "analysis": {
    "classification": "type_a | type_b | unknown",
    "confidence": 0.0,
    "uncertainty_level": "low | medium | high",
    "recommended_action": "proceed | wait | escalate | ignore",
    "reason_codes": ["code_a", "code_b"]
  }
}"#;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub classification: String,
    pub confidence: f64,
    pub uncertainty_level: String,
    pub recommended_action: String,
    pub reason_codes: Vec<String>,
}

/// A decision in the shape the model is asked to produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub task_id: String,
    pub event_type: String,
    pub analysis: Analysis,
}

/// How the task cycle acts on a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recommendation {
    Proceed,
    Wait,
    Escalate,
    Ignore,
    Other,
}

impl Decision {
    /// The decision substituted when the module cannot answer.
    pub fn fallback(input: &DecisionInput, reason_code: &str) -> Self {
        Self {
            task_id: input.task_id.clone(),
            event_type: input.event_type.clone(),
            analysis: Analysis {
                classification: "unknown".into(),
                confidence: 0.0,
                uncertainty_level: "high".into(),
                recommended_action: "escalate".into(),
                reason_codes: vec![reason_code.to_string()],
            },
        }
    }

    pub fn recommendation(&self) -> Recommendation {
        match self.analysis.recommended_action.trim().to_ascii_lowercase().as_str() {
            "proceed" => Recommendation::Proceed,
            "wait" => Recommendation::Wait,
            "escalate" => Recommendation::Escalate,
            "ignore" => Recommendation::Ignore,
            _ => Recommendation::Other,
        }
    }
}

#[derive(Debug, Error)]
pub enum DecisionError {
    #[error("no API key configured for the decision model")]
    MissingApiKey,

    #[error("decision call failed: {0}")]
    CallFailed(String),

    #[error("decision output did not match the schema: {0}")]
    InvalidOutput(String),
}

impl DecisionError {
    /// Reason code recorded in the fallback decision.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::MissingApiKey => "missing_api_key",
            Self::CallFailed(_) => "ai_call_failed",
            Self::InvalidOutput(_) => "invalid_ai_output",
        }
    }
}

#[async_trait]
pub trait DecisionModule: Send + Sync {
    async fn decide(&self, input: &DecisionInput) -> Result<Decision, DecisionError>;
}

/// Asks a completion service for a JSON decision.
pub struct LlmDecisionModule {
    provider: Option<Arc<dyn Provider>>,
    model: String,
}

impl LlmDecisionModule {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider: Some(provider),
            model: model.into(),
        }
    }

    /// A module with no credentials; every call falls back.
    pub fn unconfigured() -> Self {
        Self {
            provider: None,
            model: String::new(),
        }
    }
}

#[async_trait]
impl DecisionModule for LlmDecisionModule {
    async fn decide(&self, input: &DecisionInput) -> Result<Decision, DecisionError> {
        let provider = self.provider.as_ref().ok_or(DecisionError::MissingApiKey)?;

        let payload = serde_json::to_string(input).map_err(|e| DecisionError::CallFailed(e.to_string()))?;
        let mut request = ProviderRequest::new(
            self.model.clone(),
            vec![Message::system(DECISION_PROMPT), Message::user(payload)],
        );
        request.temperature = 0.0;
        request.max_tokens = Some(400);
        request.json_response = true;

        let response = provider
            .complete(request)
            .await
            .map_err(|e| DecisionError::CallFailed(e.to_string()))?;

        parse_decision(response.message.text())
    }
}

/// Parse and shape-check a raw model reply.
pub fn parse_decision(text: &str) -> Result<Decision, DecisionError> {
    serde_json::from_str(text.trim()).map_err(|e| DecisionError::InvalidOutput(e.to_string()))
}

/// Ask `module`, substituting [`Decision::fallback`] on any failure.
pub async fn decide_with_fallback(module: &dyn DecisionModule, input: &DecisionInput) -> Decision {
    match module.decide(input).await {
        Ok(decision) => {
            debug!(task_id = %input.task_id, action = %decision.analysis.recommended_action, "Decision received");
            decision
        }
        Err(e) => {
            warn!(task_id = %input.task_id, error = %e, "Decision module unavailable, using fallback");
            Decision::fallback(input, e.reason_code())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escalation::EventContext;
    use chrono::Utc;
    use starbot_core::error::ProviderError;
    use starbot_core::provider::ProviderResponse;
    use std::sync::Mutex;

    fn input() -> DecisionInput {
        DecisionInput {
            task_id: "watch_tmp".into(),
            event_type: "file_detected_but_action_failed".into(),
            decision_required: "classify".into(),
            context: EventContext {
                action_success: false,
                error_streak: 3,
                unknown_pattern: false,
                metrics_conflict: false,
                last_error: Some("Permission denied".into()),
            },
            timestamp: Utc::now(),
        }
    }

    struct CannedProvider {
        reply: Result<String, ProviderError>,
        seen: Mutex<Option<ProviderRequest>>,
    }

    #[async_trait]
    impl Provider for CannedProvider {
        fn name(&self) -> &str {
            "canned"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            *self.seen.lock().unwrap() = Some(request);
            self.reply.clone().map(|text| ProviderResponse {
                message: Message::assistant(text),
                usage: None,
                model: "m".into(),
            })
        }
    }

    fn canned(reply: Result<String, ProviderError>) -> Arc<CannedProvider> {
        Arc::new(CannedProvider {
            reply,
            seen: Mutex::new(None),
        })
    }

    #[tokio::test]
    async fn conforming_reply_is_used() {
        let provider = canned(Ok(r#"{"task_id":"watch_tmp","event_type":"e","analysis":{"classification":"type_a","confidence":0.8,"uncertainty_level":"low","recommended_action":"ignore","reason_codes":["benign"]}}"#.into()));
        let module = LlmDecisionModule::new(provider.clone(), "decider");

        let decision = decide_with_fallback(&module, &input()).await;
        assert_eq!(decision.recommendation(), Recommendation::Ignore);
        assert_eq!(decision.analysis.reason_codes, vec!["benign"]);

        let seen = provider.seen.lock().unwrap().take().unwrap();
        assert_eq!(seen.temperature, 0.0);
        assert_eq!(seen.max_tokens, Some(400));
        assert!(seen.json_response);
        assert_eq!(seen.messages[0].text(), DECISION_PROMPT);
        assert!(seen.messages[1].text().contains("\"error_streak\":3"));
    }

    #[tokio::test]
    async fn missing_credentials_fall_back() {
        let decision = decide_with_fallback(&LlmDecisionModule::unconfigured(), &input()).await;
        assert_eq!(decision.recommendation(), Recommendation::Escalate);
        assert_eq!(decision.analysis.uncertainty_level, "high");
        assert_eq!(decision.analysis.confidence, 0.0);
        assert_eq!(decision.analysis.reason_codes, vec!["missing_api_key"]);
        assert_eq!(decision.task_id, "watch_tmp");
    }

    #[tokio::test]
    async fn call_failure_falls_back() {
        let module = LlmDecisionModule::new(canned(Err(ProviderError::Network("refused".into()))), "m");
        let decision = decide_with_fallback(&module, &input()).await;
        assert_eq!(decision.analysis.reason_codes, vec!["ai_call_failed"]);
    }

    #[tokio::test]
    async fn malformed_reply_falls_back() {
        // confidence must be a number
        let module = LlmDecisionModule::new(
            canned(Ok(r#"{"task_id":"a","event_type":"b","analysis":{"classification":"x","confidence":"high","uncertainty_level":"low","recommended_action":"wait","reason_codes":[]}}"#.into())),
            "m",
        );
        let decision = decide_with_fallback(&module, &input()).await;
        assert_eq!(decision.analysis.reason_codes, vec!["invalid_ai_output"]);

        let module = LlmDecisionModule::new(canned(Ok("sure, I'd ignore it".into())), "m");
        let decision = decide_with_fallback(&module, &input()).await;
        assert_eq!(decision.recommendation(), Recommendation::Escalate);
    }

    #[test]
    fn unrecognized_action_maps_to_other() {
        let mut d = Decision::fallback(&input(), "x");
        d.analysis.recommended_action = "reboot".into();
        assert_eq!(d.recommendation(), Recommendation::Other);
        d.analysis.recommended_action = " Wait ".into();
        assert_eq!(d.recommendation(), Recommendation::Wait);
    }
}
