pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::types::{
    Activity, Appointment, AppointmentView, Automation, ChatMessage, Conversation,
    ConversationView, Integration, Lead, LeadSummary, NewActivity, NewMessage, QuickReply,
    Sentiment, User,
};

use memory::MemStore;
use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub fn now_iso() -> String {
    Utc::now().to_rfc3339()
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Random 16-byte hex token used as a per-integration webhook secret.
pub fn new_webhook_secret() -> String {
    Uuid::new_v4().simple().to_string()
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn create(&self, user: &User) -> Result<(), StoreError>;
    async fn find_by_api_key(&self, api_key: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn update(&self, user: &User) -> Result<(), StoreError>;
}

#[async_trait]
pub trait LeadRepo: Send + Sync {
    async fn create(&self, lead: &Lead) -> Result<(), StoreError>;
    async fn list(&self, user_id: &str, status: Option<&str>)
        -> Result<Vec<LeadSummary>, StoreError>;
    async fn find(&self, user_id: &str, lead_id: &str) -> Result<Option<Lead>, StoreError>;
    async fn update_status(
        &self,
        user_id: &str,
        lead_id: &str,
        status: &str,
    ) -> Result<Option<Lead>, StoreError>;
    async fn delete(&self, user_id: &str, lead_id: &str) -> Result<bool, StoreError>;
    async fn count(&self, user_id: &str) -> Result<i64, StoreError>;
    async fn count_by_status(&self, user_id: &str, status: &str) -> Result<i64, StoreError>;
    async fn count_by_source(&self, user_id: &str, source: &str) -> Result<i64, StoreError>;
    async fn count_score_above(&self, user_id: &str, score: i32) -> Result<i64, StoreError>;
    async fn count_score_below(&self, user_id: &str, score: i32) -> Result<i64, StoreError>;
    async fn count_created_since(&self, user_id: &str, since: &str) -> Result<i64, StoreError>;
}

#[async_trait]
pub trait ConversationRepo: Send + Sync {
    async fn create(&self, conversation: &Conversation) -> Result<(), StoreError>;
    async fn find(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<Option<Conversation>, StoreError>;
    async fn list_views(&self, user_id: &str) -> Result<Vec<ConversationView>, StoreError>;
    async fn latest_for_lead(&self, lead_id: &str) -> Result<Option<Conversation>, StoreError>;
    /// Writes the classifier judgement onto the thread: sentiment, score,
    /// unread_count + 1, updated_at.
    async fn apply_analysis(
        &self,
        conversation_id: &str,
        sentiment: Sentiment,
        score: i32,
    ) -> Result<(), StoreError>;
    async fn touch(&self, conversation_id: &str) -> Result<(), StoreError>;
    async fn count(&self, user_id: &str) -> Result<i64, StoreError>;
    async fn count_by_sentiment(
        &self,
        user_id: &str,
        sentiment: Sentiment,
    ) -> Result<i64, StoreError>;
}

#[async_trait]
pub trait MessageRepo: Send + Sync {
    async fn append(&self, message: NewMessage) -> Result<ChatMessage, StoreError>;
    /// Full history, ascending by creation time.
    async fn list(&self, conversation_id: &str) -> Result<Vec<ChatMessage>, StoreError>;
    /// Last `limit` messages, still ascending.
    async fn recent(
        &self,
        conversation_id: &str,
        limit: i64,
    ) -> Result<Vec<ChatMessage>, StoreError>;
}

#[async_trait]
pub trait ActivityRepo: Send + Sync {
    async fn append(&self, user_id: &str, activity: NewActivity) -> Result<Activity, StoreError>;
    async fn recent(&self, user_id: &str, limit: i64) -> Result<Vec<Activity>, StoreError>;
    async fn count_by_title(&self, user_id: &str, title: &str) -> Result<i64, StoreError>;
}

#[async_trait]
pub trait AppointmentRepo: Send + Sync {
    async fn create(&self, appointment: &Appointment) -> Result<(), StoreError>;
    async fn list_between(
        &self,
        user_id: &str,
        start: &str,
        end: &str,
    ) -> Result<Vec<AppointmentView>, StoreError>;
    async fn upcoming(
        &self,
        user_id: &str,
        after: &str,
        limit: i64,
    ) -> Result<Vec<AppointmentView>, StoreError>;
    async fn delete(&self, user_id: &str, appointment_id: &str) -> Result<bool, StoreError>;
    async fn count_between(
        &self,
        user_id: &str,
        start: &str,
        end: &str,
    ) -> Result<i64, StoreError>;
}

#[async_trait]
pub trait AutomationRepo: Send + Sync {
    async fn create(&self, automation: &Automation) -> Result<(), StoreError>;
    async fn create_many(&self, automations: &[Automation]) -> Result<(), StoreError>;
    async fn list(&self, user_id: &str) -> Result<Vec<Automation>, StoreError>;
    async fn set_active(
        &self,
        user_id: &str,
        automation_id: &str,
        active: bool,
    ) -> Result<Option<Automation>, StoreError>;
    async fn find(
        &self,
        user_id: &str,
        automation_id: &str,
    ) -> Result<Option<Automation>, StoreError>;
    async fn delete(&self, user_id: &str, automation_id: &str) -> Result<bool, StoreError>;
    async fn count(&self, user_id: &str) -> Result<i64, StoreError>;
}

#[async_trait]
pub trait QuickReplyRepo: Send + Sync {
    async fn create(&self, reply: &QuickReply) -> Result<(), StoreError>;
    async fn create_many(&self, replies: &[QuickReply]) -> Result<(), StoreError>;
    async fn list(&self, user_id: &str) -> Result<Vec<QuickReply>, StoreError>;
    async fn delete(&self, user_id: &str, reply_id: &str) -> Result<bool, StoreError>;
    async fn increment_usage(
        &self,
        user_id: &str,
        reply_id: &str,
    ) -> Result<Option<QuickReply>, StoreError>;
    async fn count(&self, user_id: &str) -> Result<i64, StoreError>;
}

#[async_trait]
pub trait IntegrationRepo: Send + Sync {
    async fn create_many(&self, integrations: &[Integration]) -> Result<(), StoreError>;
    async fn list(&self, user_id: &str) -> Result<Vec<Integration>, StoreError>;
    async fn find(
        &self,
        user_id: &str,
        integration_id: &str,
    ) -> Result<Option<Integration>, StoreError>;
    async fn find_by_platform(
        &self,
        user_id: &str,
        platform: &str,
    ) -> Result<Option<Integration>, StoreError>;
    /// Webhook ingest authentication: secret + platform, connected rows only.
    async fn find_connected_by_secret(
        &self,
        secret: &str,
        platform: &str,
    ) -> Result<Option<Integration>, StoreError>;
    async fn connect(
        &self,
        user_id: &str,
        platform: &str,
        api_key: &str,
        webhook_url: &str,
        metadata: &Value,
    ) -> Result<Integration, StoreError>;
    async fn upsert_status(
        &self,
        user_id: &str,
        platform: &str,
        status: &str,
    ) -> Result<Integration, StoreError>;
    async fn disconnect(
        &self,
        user_id: &str,
        integration_id: &str,
    ) -> Result<Option<Integration>, StoreError>;
    async fn set_status(
        &self,
        user_id: &str,
        integration_id: &str,
        status: &str,
    ) -> Result<(), StoreError>;
}

/// Every persistence dependency of the server, one handle per entity so tests
/// can swap the whole set for the in-memory store.
#[derive(Clone)]
pub struct Repos {
    pub users: Arc<dyn UserRepo>,
    pub leads: Arc<dyn LeadRepo>,
    pub conversations: Arc<dyn ConversationRepo>,
    pub messages: Arc<dyn MessageRepo>,
    pub activities: Arc<dyn ActivityRepo>,
    pub appointments: Arc<dyn AppointmentRepo>,
    pub automations: Arc<dyn AutomationRepo>,
    pub quick_replies: Arc<dyn QuickReplyRepo>,
    pub integrations: Arc<dyn IntegrationRepo>,
}

impl Repos {
    pub fn postgres(pool: PgPool) -> Repos {
        let store = Arc::new(PgStore::new(pool));
        Repos {
            users: store.clone(),
            leads: store.clone(),
            conversations: store.clone(),
            messages: store.clone(),
            activities: store.clone(),
            appointments: store.clone(),
            automations: store.clone(),
            quick_replies: store.clone(),
            integrations: store,
        }
    }

    pub fn in_memory() -> Repos {
        Repos::from_mem(Arc::new(MemStore::default()))
    }

    pub fn from_mem(store: Arc<MemStore>) -> Repos {
        Repos {
            users: store.clone(),
            leads: store.clone(),
            conversations: store.clone(),
            messages: store.clone(),
            activities: store.clone(),
            appointments: store.clone(),
            automations: store.clone(),
            quick_replies: store.clone(),
            integrations: store,
        }
    }
}
