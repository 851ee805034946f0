//! Automated player backed by a text-generation service.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::conversation::Conversation;
use crate::core::extract::extract_choice;
use crate::core::prompt::{MovePrompt, build_move_prompt, presented_links};
use crate::core::types::{GameStep, StepMetadata};
use crate::io::completion::{
    CompletionClient, CompletionRequest, DEFAULT_API_BASE, DEFAULT_REQUEST_TIMEOUT,
};

use super::{Decider, Decision};

/// Model and retry settings shared by every automated player in a batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentSettings {
    pub model: String,
    pub api_base: String,
    /// Only the first `max_links` links of an article are offered.
    pub max_links: Option<usize>,
    /// Completion attempts per move before giving up.
    pub max_tries: u32,
    /// Upper bound on a single completion call, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            max_links: Some(200),
            max_tries: 3,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
        }
    }
}

impl AgentSettings {
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            bail!("model must be non-empty");
        }
        if self.api_base.trim().is_empty() {
            bail!("api_base must be non-empty");
        }
        if self.max_tries == 0 {
            bail!("max_tries must be > 0");
        }
        if self.max_links == Some(0) {
            bail!("max_links must be > 0");
        }
        if self.request_timeout_secs == 0 {
            bail!("request_timeout_secs must be > 0");
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Automated player. Each move is one conversation with the model; malformed
/// answers are corrected in-conversation up to `max_tries` times.
pub struct AgentDecider {
    settings: AgentSettings,
    target: String,
    seed: Option<u64>,
    verbose: bool,
    client: Arc<dyn CompletionClient>,
}

impl AgentDecider {
    pub fn new(
        settings: AgentSettings,
        target: impl Into<String>,
        client: Arc<dyn CompletionClient>,
    ) -> Self {
        Self {
            settings,
            target: target.into(),
            seed: None,
            verbose: false,
            client,
        }
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    /// Run the answer/correct loop on an existing conversation.
    ///
    /// `links` are the links the prompt presented, in prompt order.
    pub async fn decide_with_conversation(
        &self,
        mut conversation: Conversation,
        links: &[String],
    ) -> Result<Decision> {
        let max_tries = self.settings.max_tries;
        for attempt in 1..=max_tries {
            let request = CompletionRequest {
                model: &self.settings.model,
                api_base: &self.settings.api_base,
                messages: conversation.messages(),
                seed: self.seed,
            };
            let response = self
                .client
                .complete(&request)
                .await
                .with_context(|| format!("completion attempt {attempt}/{max_tries}"))?;
            if self.verbose {
                info!(attempt, response = %response, "model response");
            }

            let extracted = extract_choice(&response, links.len());
            conversation.push_assistant(response);
            match extracted {
                Ok(choice) => {
                    let link = links[choice - 1].clone();
                    debug!(attempt, choice, link = %link, "answer accepted");
                    return Ok(Decision::link(
                        link,
                        StepMetadata {
                            tries: Some(attempt),
                            conversation: conversation.into_messages(),
                            ..StepMetadata::default()
                        },
                    ));
                }
                Err(err) => {
                    debug!(attempt, error = %err, "answer rejected");
                    conversation.push_user(err.correction());
                }
            }
        }

        Ok(Decision::no_move(StepMetadata {
            message: Some(format!("no valid answer after {max_tries} tries")),
            tries: Some(max_tries),
            conversation: conversation.into_messages(),
            ..StepMetadata::default()
        }))
    }
}

#[async_trait]
impl Decider for AgentDecider {
    async fn get_move(&mut self, history: &[GameStep]) -> Result<Decision> {
        let current = history.last().context("move requested with empty history")?;
        let current_title = current
            .article
            .as_deref()
            .context("move requested after a lose step")?;
        let links = presented_links(&current.links, self.settings.max_links);
        if links.is_empty() {
            return Ok(Decision::no_move(StepMetadata {
                message: Some(format!("{current_title} has no links")),
                tries: Some(0),
                ..StepMetadata::default()
            }));
        }

        let path: Vec<&str> = history
            .iter()
            .filter_map(|step| step.article.as_deref())
            .collect();
        let prompt = build_move_prompt(&MovePrompt {
            current: current_title,
            target: &self.target,
            links,
            path: &path,
        })?;
        self.decide_with_conversation(Conversation::with_prompt(prompt), links)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::conversation::Role;
    use crate::core::types::StepKind;
    use crate::test_support::{ScriptedClient, ScriptedReply};

    fn start(article: &str, links: &[&str]) -> GameStep {
        GameStep {
            kind: StepKind::Start,
            article: Some(article.to_string()),
            links: links.iter().map(|link| link.to_string()).collect(),
            metadata: StepMetadata::default(),
        }
    }

    fn settings(max_tries: u32) -> AgentSettings {
        AgentSettings {
            max_tries,
            ..AgentSettings::default()
        }
    }

    #[tokio::test]
    async fn first_valid_answer_wins() {
        let client = Arc::new(ScriptedClient::always("Berlin is closer. <answer>2</answer>"));
        let mut decider = AgentDecider::new(settings(3), "Germany", client.clone());

        let decision = decider
            .get_move(&[start("Europe", &["Paris", "Berlin"])])
            .await
            .expect("move");

        assert_eq!(decision.choice.as_deref(), Some("Berlin"));
        assert_eq!(decision.metadata.tries, Some(1));
        assert_eq!(decision.metadata.conversation.len(), 2);
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn corrections_continue_the_same_conversation() {
        let client = Arc::new(ScriptedClient::new(vec![
            ScriptedReply::text("I like the second one"),
            ScriptedReply::text("<answer>9</answer>"),
            ScriptedReply::text("<answer>1</answer>"),
        ]));
        let decider = AgentDecider::new(settings(3), "Z", client.clone());
        let links = vec!["A".to_string(), "B".to_string()];

        let decision = decider
            .decide_with_conversation(Conversation::with_prompt("pick"), &links)
            .await
            .expect("move");

        assert_eq!(decision.choice.as_deref(), Some("A"));
        assert_eq!(decision.metadata.tries, Some(3));
        let conversation = &decision.metadata.conversation;
        assert_eq!(conversation.len(), 6);
        assert_eq!(conversation[2].role, Role::User);
        assert!(conversation[2].content.contains("No answer found"));
        assert!(conversation[4].content.contains("between 1 and 2"));

        let requests = client.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].len(), 1);
        assert_eq!(requests[2].len(), 5);
    }

    #[tokio::test]
    async fn exhausted_tries_yield_no_move() {
        let client = Arc::new(ScriptedClient::always("no idea"));
        let decider = AgentDecider::new(settings(2), "Z", client.clone());
        let links = vec!["B".to_string()];

        let decision = decider
            .decide_with_conversation(Conversation::with_prompt("pick"), &links)
            .await
            .expect("no fault");

        assert_eq!(decision.choice, None);
        assert_eq!(decision.metadata.tries, Some(2));
        assert_eq!(decision.metadata.conversation.len(), 5);
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test]
    async fn transport_failure_is_an_error() {
        let client = Arc::new(ScriptedClient::new(vec![ScriptedReply::fail(503)]));
        let mut decider = AgentDecider::new(settings(3), "Z", client);

        let err = decider
            .get_move(&[start("A", &["B"])])
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("503"));
    }

    #[tokio::test]
    async fn seed_is_forwarded_and_links_truncated() {
        let client = Arc::new(ScriptedClient::always("<answer>2</answer>"));
        let settings = AgentSettings {
            max_links: Some(2),
            ..AgentSettings::default()
        };
        let mut decider = AgentDecider::new(settings, "Z", client.clone()).with_seed(Some(42));

        let decision = decider
            .get_move(&[start("A", &["B", "C", "D"])])
            .await
            .expect("move");

        assert_eq!(decision.choice.as_deref(), Some("C"));
        assert_eq!(client.seeds(), vec![Some(42)]);
        let prompt = &client.requests()[0][0].content;
        assert!(prompt.contains("2. C"));
        assert!(!prompt.contains("3. D"));
    }

    #[tokio::test]
    async fn no_links_skips_the_service() {
        let client = Arc::new(ScriptedClient::always("<answer>1</answer>"));
        let mut decider = AgentDecider::new(settings(3), "Z", client.clone());

        let decision = decider.get_move(&[start("A", &[])]).await.expect("move");
        assert_eq!(decision.choice, None);
        assert_eq!(client.calls(), 0);
    }

    #[test]
    fn settings_validation() {
        assert!(AgentSettings::default().validate().is_ok());
        assert!(settings(0).validate().is_err());
        let no_links = AgentSettings {
            max_links: Some(0),
            ..AgentSettings::default()
        };
        assert!(no_links.validate().is_err());
        let no_timeout = AgentSettings {
            request_timeout_secs: 0,
            ..AgentSettings::default()
        };
        assert!(no_timeout.validate().is_err());
        assert_eq!(
            AgentSettings::default().request_timeout(),
            Duration::from_secs(120)
        );
    }
}
