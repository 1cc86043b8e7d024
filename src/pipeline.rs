use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::ai::{AiError, SalesAssistant};
use crate::prompting::{render_outreach_prompt, OutreachContext};
use crate::store::{Repos, StoreError};
use crate::types::{
    ChatMessage, HistoryTurn, LeadAnalysis, NewActivity, NewMessage, PipelineStats, Sender,
    Sentiment, User,
};

/// Canned reply persisted when the generator is down. The customer still gets
/// an answer and the thread stays consistent.
pub const AUTO_REPLY_FALLBACK: &str =
    "Thank you for reaching out. An agent will get back to you shortly.";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("conversation not found")]
    ConversationNotFound,
    #[error("lead not found")]
    LeadNotFound,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("outreach generation failed: {0}")]
    Generation(#[from] AiError),
}

#[derive(Debug)]
pub struct InboundOutcome {
    pub customer_message: ChatMessage,
    pub reply: ChatMessage,
    pub analysis: LeadAnalysis,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutreachDraft {
    pub message: String,
    pub lead: OutreachContact,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutreachContact {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub source: String,
}

/// Inbound-message orchestration plus the outreach composer. Owns no state of
/// its own; everything goes through the repos and the assistant.
#[derive(Clone)]
pub struct Pipeline {
    repos: Repos,
    assistant: Arc<dyn SalesAssistant>,
}

impl Pipeline {
    pub fn new(repos: Repos, assistant: Arc<dyn SalesAssistant>) -> Pipeline {
        Pipeline { repos, assistant }
    }

    /// Runs the full auto-reply flow for one customer message:
    /// persist the message, classify it, update the thread, draft and persist
    /// the reply, then log an activity. Classification and generation degrade
    /// to defaults on failure; only storage errors on the message writes abort
    /// the run.
    pub async fn handle_inbound_message(
        &self,
        user: &User,
        conversation_id: &str,
        text: &str,
    ) -> Result<InboundOutcome, PipelineError> {
        let conversation = self
            .repos
            .conversations
            .find(&user.id, conversation_id)
            .await?
            .ok_or(PipelineError::ConversationNotFound)?;

        // History is captured before the new message lands so the generator
        // sees it exactly once, as the latest turn.
        let history = self
            .repos
            .messages
            .list(conversation_id)
            .await?
            .into_iter()
            .map(|m| HistoryTurn {
                sender: m.sender,
                text: m.text,
            })
            .collect::<Vec<_>>();

        let customer_message = self
            .repos
            .messages
            .append(NewMessage {
                conversation_id: conversation_id.to_string(),
                sender: Sender::Customer,
                text: text.to_string(),
                sentiment: None,
            })
            .await?;

        let analysis = match self.assistant.analyze_lead_message(text).await {
            Ok(analysis) => analysis,
            Err(err) => {
                warn!(error = %err, conversation_id, "lead classification failed, using fallback");
                LeadAnalysis::fallback()
            }
        };

        self.repos
            .conversations
            .apply_analysis(conversation_id, analysis.sentiment, analysis.lead_score)
            .await?;

        let reply_text = match self
            .assistant
            .generate_auto_response(user, &history, text)
            .await
        {
            Ok(reply) if !reply.trim().is_empty() => reply,
            Ok(_) => AUTO_REPLY_FALLBACK.to_string(),
            Err(err) => {
                warn!(error = %err, conversation_id, "auto-reply generation failed, using canned reply");
                AUTO_REPLY_FALLBACK.to_string()
            }
        };

        let reply = self
            .repos
            .messages
            .append(NewMessage {
                conversation_id: conversation_id.to_string(),
                sender: Sender::Ai,
                text: reply_text,
                sentiment: Some(Sentiment::Neutral),
            })
            .await?;

        // The activity feed is advisory; a failed write must not undo the
        // reply that already landed.
        let activity = NewActivity {
            title: "AI Auto-replied".to_string(),
            description: format!("Intent detected: {}", analysis.intent),
            channel: conversation.channel.clone(),
            status: "Replied".to_string(),
        };
        if let Err(err) = self.repos.activities.append(&user.id, activity).await {
            warn!(error = %err, conversation_id, "failed to record auto-reply activity");
        }

        Ok(InboundOutcome {
            customer_message,
            reply,
            analysis,
        })
    }

    /// Drafts a first-touch message for a lead. Uses the last turns of the
    /// latest conversation as context when one exists. Unlike the inbound
    /// flow this writes nothing, so generator failures surface to the caller.
    pub async fn generate_outreach(
        &self,
        user: &User,
        lead_id: &str,
        channel: &str,
        tone: &str,
    ) -> Result<OutreachDraft, PipelineError> {
        let lead = self
            .repos
            .leads
            .find(&user.id, lead_id)
            .await?
            .ok_or(PipelineError::LeadNotFound)?;

        let mut history = Vec::new();
        if let Some(conversation) = self.repos.conversations.latest_for_lead(&lead.id).await? {
            history = self
                .repos
                .messages
                .recent(&conversation.id, 5)
                .await?
                .into_iter()
                .map(|m| HistoryTurn {
                    sender: m.sender,
                    text: m.text,
                })
                .collect();
        }

        let prompt = render_outreach_prompt(&OutreachContext {
            name: &lead.name,
            channel,
            tone,
            email: &lead.email,
            score: lead.score,
            sentiment: lead.sentiment.as_str(),
            status: &lead.status,
            tags: &lead.tags,
        });

        let message = self
            .assistant
            .generate_auto_response(user, &history, &prompt)
            .await?;

        Ok(OutreachDraft {
            message,
            lead: OutreachContact {
                name: lead.name,
                email: lead.email,
                phone: lead.phone,
                source: lead.source,
            },
        })
    }

    /// Counters for the daily lead health brief.
    pub async fn pipeline_stats(&self, user_id: &str) -> Result<PipelineStats, PipelineError> {
        let today_start = format!("{}T00:00:00+00:00", Utc::now().format("%Y-%m-%d"));
        Ok(PipelineStats {
            total_leads: self.repos.leads.count(user_id).await?,
            new_leads: self
                .repos
                .leads
                .count_created_since(user_id, &today_start)
                .await?,
            hot_leads: self.repos.leads.count_score_above(user_id, 80).await?,
            cold_leads: self.repos.leads.count_score_below(user_id, 30).await?,
            converted_leads: self.repos.leads.count_by_status(user_id, "converted").await?,
            negative_conversations: self
                .repos
                .conversations
                .count_by_sentiment(user_id, Sentiment::Negative)
                .await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemStore;
    use crate::store::{new_id, now_iso, ActivityRepo, ConversationRepo, LeadRepo, MessageRepo, UserRepo};
    use crate::types::{Conversation, Lead};
    use async_trait::async_trait;

    struct ScriptedAssistant {
        analysis: Option<LeadAnalysis>,
        reply: Option<String>,
    }

    impl ScriptedAssistant {
        fn working() -> ScriptedAssistant {
            ScriptedAssistant {
                analysis: Some(LeadAnalysis {
                    intent: "Asking about pricing".to_string(),
                    sentiment: Sentiment::Positive,
                    lead_score: 85,
                }),
                reply: Some("Our plans start at $49/month. Want a quick demo call?".to_string()),
            }
        }
    }

    #[async_trait]
    impl SalesAssistant for ScriptedAssistant {
        async fn analyze_lead_message(&self, _message: &str) -> Result<LeadAnalysis, AiError> {
            self.analysis.clone().ok_or(AiError::EmptyResponse)
        }

        async fn generate_auto_response(
            &self,
            _profile: &User,
            _history: &[HistoryTurn],
            _new_message: &str,
        ) -> Result<String, AiError> {
            self.reply.clone().ok_or(AiError::EmptyResponse)
        }

        async fn summarize_conversation(
            &self,
            _messages: &[ChatMessage],
        ) -> Result<String, AiError> {
            Ok("Summary.".to_string())
        }

        async fn lead_health_brief(&self, _stats: PipelineStats) -> Result<String, AiError> {
            Ok("Brief.".to_string())
        }
    }

    struct Fixture {
        store: Arc<MemStore>,
        user: User,
        conversation_id: String,
        lead_id: String,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemStore::default());
        let user = User {
            id: new_id(),
            api_key: new_id(),
            email: "owner@acme.test".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Okafor".to_string(),
            business_name: "Acme Dental".to_string(),
            industry: "Healthcare".to_string(),
            business_hours: "8 AM to 4 PM".to_string(),
            team_size: "2-5".to_string(),
            onboarding_complete: true,
            created_at: now_iso(),
        };
        UserRepo::create(store.as_ref(), &user).await.unwrap();
        let lead = Lead {
            id: new_id(),
            user_id: user.id.clone(),
            name: "Sam Lee".to_string(),
            email: "sam@example.test".to_string(),
            phone: "+15550100".to_string(),
            source: "website".to_string(),
            status: "new".to_string(),
            score: 50,
            sentiment: Sentiment::Neutral,
            tags: vec![],
            created_at: now_iso(),
            updated_at: now_iso(),
        };
        LeadRepo::create(store.as_ref(), &lead).await.unwrap();
        let conversation = Conversation {
            id: new_id(),
            user_id: user.id.clone(),
            lead_id: lead.id.clone(),
            channel: "web".to_string(),
            sentiment: Sentiment::Neutral,
            score: 50,
            unread_count: 0,
            created_at: now_iso(),
            updated_at: now_iso(),
        };
        ConversationRepo::create(store.as_ref(), &conversation)
            .await
            .unwrap();
        Fixture {
            store,
            user,
            conversation_id: conversation.id,
            lead_id: lead.id,
        }
    }

    fn pipeline(fx: &Fixture, assistant: ScriptedAssistant) -> Pipeline {
        Pipeline::new(Repos::from_mem(fx.store.clone()), Arc::new(assistant))
    }

    #[tokio::test]
    async fn inbound_message_appends_both_turns_and_updates_thread() {
        let fx = fixture().await;
        let pipeline = pipeline(&fx, ScriptedAssistant::working());

        let outcome = pipeline
            .handle_inbound_message(&fx.user, &fx.conversation_id, "What are your prices?")
            .await
            .unwrap();

        assert_eq!(outcome.customer_message.sender, Sender::Customer);
        assert_eq!(outcome.customer_message.sentiment, None);
        assert_eq!(outcome.reply.sender, Sender::Ai);
        assert_eq!(outcome.reply.sentiment, Some(Sentiment::Neutral));

        let messages = MessageRepo::list(fx.store.as_ref(), &fx.conversation_id)
            .await
            .unwrap();
        assert_eq!(messages.len(), 2);

        let conversation = ConversationRepo::find(fx.store.as_ref(), &fx.user.id, &fx.conversation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conversation.unread_count, 1);
        assert_eq!(conversation.sentiment, Sentiment::Positive);
        assert_eq!(conversation.score, 85);

        let activities = ActivityRepo::recent(fx.store.as_ref(), &fx.user.id, 10)
            .await
            .unwrap();
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].title, "AI Auto-replied");
        assert_eq!(activities[0].description, "Intent detected: Asking about pricing");
        assert_eq!(activities[0].channel, "web");
    }

    #[tokio::test]
    async fn classifier_failure_degrades_to_neutral_defaults() {
        let fx = fixture().await;
        let assistant = ScriptedAssistant {
            analysis: None,
            ..ScriptedAssistant::working()
        };
        let pipeline = pipeline(&fx, assistant);

        let outcome = pipeline
            .handle_inbound_message(&fx.user, &fx.conversation_id, "hello")
            .await
            .unwrap();

        assert_eq!(outcome.analysis.intent, "Unknown intent");
        let conversation = ConversationRepo::find(fx.store.as_ref(), &fx.user.id, &fx.conversation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conversation.sentiment, Sentiment::Neutral);
        assert_eq!(conversation.score, 50);
        assert_eq!(conversation.unread_count, 1);

        // A real reply still goes out.
        let messages = MessageRepo::list(fx.store.as_ref(), &fx.conversation_id)
            .await
            .unwrap();
        assert_eq!(messages.len(), 2);
    }

    #[tokio::test]
    async fn generator_failure_sends_canned_reply() {
        let fx = fixture().await;
        let assistant = ScriptedAssistant {
            reply: None,
            ..ScriptedAssistant::working()
        };
        let pipeline = pipeline(&fx, assistant);

        let outcome = pipeline
            .handle_inbound_message(&fx.user, &fx.conversation_id, "hello")
            .await
            .unwrap();

        assert_eq!(outcome.reply.text, AUTO_REPLY_FALLBACK);
        let messages = MessageRepo::list(fx.store.as_ref(), &fx.conversation_id)
            .await
            .unwrap();
        assert_eq!(messages.len(), 2);
    }

    #[tokio::test]
    async fn failed_message_insert_aborts_before_side_effects() {
        let fx = fixture().await;
        let pipeline = pipeline(&fx, ScriptedAssistant::working());
        fx.store.fail_message_inserts(true);

        let err = pipeline
            .handle_inbound_message(&fx.user, &fx.conversation_id, "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Store(_)));

        fx.store.fail_message_inserts(false);
        let messages = MessageRepo::list(fx.store.as_ref(), &fx.conversation_id)
            .await
            .unwrap();
        assert!(messages.is_empty());

        let conversation = ConversationRepo::find(fx.store.as_ref(), &fx.user.id, &fx.conversation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conversation.unread_count, 0);
        assert_eq!(
            ActivityRepo::recent(fx.store.as_ref(), &fx.user.id, 10)
                .await
                .unwrap()
                .len(),
            0
        );
    }

    #[tokio::test]
    async fn reruns_append_fresh_turns_each_time() {
        let fx = fixture().await;
        let pipeline = pipeline(&fx, ScriptedAssistant::working());

        pipeline
            .handle_inbound_message(&fx.user, &fx.conversation_id, "hello")
            .await
            .unwrap();
        pipeline
            .handle_inbound_message(&fx.user, &fx.conversation_id, "hello")
            .await
            .unwrap();

        let messages = MessageRepo::list(fx.store.as_ref(), &fx.conversation_id)
            .await
            .unwrap();
        assert_eq!(messages.len(), 4);

        let conversation = ConversationRepo::find(fx.store.as_ref(), &fx.user.id, &fx.conversation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conversation.unread_count, 2);
    }

    #[tokio::test]
    async fn conversation_of_another_tenant_is_invisible() {
        let fx = fixture().await;
        let pipeline = pipeline(&fx, ScriptedAssistant::working());
        let mut other = fx.user.clone();
        other.id = new_id();

        let err = pipeline
            .handle_inbound_message(&other, &fx.conversation_id, "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ConversationNotFound));
    }

    #[tokio::test]
    async fn outreach_returns_draft_with_contact_card() {
        let fx = fixture().await;
        let pipeline = pipeline(&fx, ScriptedAssistant::working());

        let draft = pipeline
            .generate_outreach(&fx.user, &fx.lead_id, "email", "casual")
            .await
            .unwrap();
        assert!(!draft.message.is_empty());
        assert_eq!(draft.lead.name, "Sam Lee");
        assert_eq!(draft.lead.email, "sam@example.test");
    }

    #[tokio::test]
    async fn outreach_propagates_generator_errors() {
        let fx = fixture().await;
        let assistant = ScriptedAssistant {
            reply: None,
            ..ScriptedAssistant::working()
        };
        let pipeline = pipeline(&fx, assistant);

        let err = pipeline
            .generate_outreach(&fx.user, &fx.lead_id, "email", "formal")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Generation(_)));
    }
}
