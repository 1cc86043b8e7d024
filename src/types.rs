use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ai::SalesAssistant;
use crate::store::Repos;

/// Sentiment attached to conversations, leads and individual messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        }
    }

    /// Lenient parse used at the database and AI boundaries.
    pub fn parse_or_neutral(value: &str) -> Sentiment {
        match value.trim().to_ascii_lowercase().as_str() {
            "positive" => Sentiment::Positive,
            "negative" => Sentiment::Negative,
            _ => Sentiment::Neutral,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    Customer,
    Agent,
    Ai,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::Customer => "customer",
            Sender::Agent => "agent",
            Sender::Ai => "ai",
        }
    }

    pub fn parse_or_agent(value: &str) -> Sender {
        match value.trim().to_ascii_lowercase().as_str() {
            "customer" => Sender::Customer,
            "ai" => Sender::Ai,
            _ => Sender::Agent,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub api_key: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub business_name: String,
    pub industry: String,
    pub business_hours: String,
    pub team_size: String,
    pub onboarding_complete: bool,
    pub created_at: String,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub source: String,
    pub status: String,
    pub score: i32,
    pub sentiment: Sentiment,
    pub tags: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Lead as listed in the dashboard, with its conversation count.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadSummary {
    #[serde(flatten)]
    pub lead: Lead,
    pub conversation_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub lead_id: String,
    pub channel: String,
    pub sentiment: Sentiment,
    pub score: i32,
    pub unread_count: i32,
    pub created_at: String,
    pub updated_at: String,
}

/// Conversation joined with its lead and full message history.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationView {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub lead: Lead,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub conversation_id: String,
    pub sender: Sender,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<Sentiment>,
    pub created_at: String,
}

/// Input for appending a message; id and timestamp are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: String,
    pub sender: Sender,
    pub text: String,
    pub sentiment: Option<Sentiment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub channel: String,
    pub status: String,
    pub created_at: String,
}

/// Input for the audit feed; `channel`/`status` default to empty.
#[derive(Debug, Clone, Default)]
pub struct NewActivity {
    pub title: String,
    pub description: String,
    pub channel: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead_id: Option<String>,
    pub title: String,
    #[serde(rename = "type")]
    pub appointment_type: String,
    pub start_time: String,
    pub end_time: String,
    pub duration: String,
    pub meeting_link: String,
    pub notes: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentView {
    #[serde(flatten)]
    pub appointment: Appointment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lead: Option<Lead>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Automation {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub description: String,
    pub trigger: String,
    pub action: String,
    pub icon: String,
    pub color: String,
    pub active: bool,
    pub runs: i32,
    pub success_rate: i32,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickReply {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub body: String,
    pub category: String,
    pub usage_count: i32,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Integration {
    pub id: String,
    pub user_id: String,
    pub platform: String,
    pub status: String,
    pub api_key: String,
    pub webhook_url: String,
    pub webhook_secret: String,
    pub metadata: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected_at: Option<String>,
    pub created_at: String,
}

/// Structured judgement returned by the classifier for one inbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadAnalysis {
    pub intent: String,
    pub sentiment: Sentiment,
    pub lead_score: i32,
}

impl LeadAnalysis {
    /// Safe default substituted when the classifier is unreachable or returns
    /// garbage. Classification is advisory, so the pipeline keeps going.
    pub fn fallback() -> LeadAnalysis {
        LeadAnalysis {
            intent: "Unknown intent".to_string(),
            sentiment: Sentiment::Neutral,
            lead_score: 50,
        }
    }
}

/// One prior turn handed to the reply generator.
#[derive(Debug, Clone)]
pub struct HistoryTurn {
    pub sender: Sender,
    pub text: String,
}

/// Pipeline counters feeding the daily lead health brief.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineStats {
    pub total_leads: i64,
    pub new_leads: i64,
    pub hot_leads: i64,
    pub cold_leads: i64,
    pub converted_leads: i64,
    pub negative_conversations: i64,
}

pub struct AppState {
    pub repos: Repos,
    pub assistant: Arc<dyn SalesAssistant>,
    pub http: reqwest::Client,
    pub public_base_url: String,
}

// ---- request bodies ----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountBody {
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchAccountBody {
    pub business_name: Option<String>,
    pub industry: Option<String>,
    pub business_hours: Option<String>,
    pub team_size: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingBody {
    pub business_name: String,
    pub industry: String,
    #[serde(default)]
    pub team_size: String,
    #[serde(default)]
    pub integrations: OnboardingIntegrations,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingIntegrations {
    pub whatsapp: Option<OnboardingCredential>,
    pub instagram: Option<OnboardingCredential>,
    pub gmail: Option<OnboardingCredential>,
    pub calendar: Option<OnboardingCredential>,
    #[serde(default)]
    pub website_forms: bool,
}

/// Key plus the one platform-specific id the Graph/Google APIs need.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingCredential {
    pub api_key: String,
    #[serde(default)]
    pub phone_number_id: String,
    #[serde(default)]
    pub ig_user_id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub calendar_id: String,
}

#[derive(Debug, Deserialize)]
pub struct LeadsQuery {
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLeadBody {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub source: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct LeadStatusBody {
    pub status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationBody {
    pub lead_id: String,
    pub channel: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageBody {
    pub sender: Option<String>,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct InboundMessageBody {
    pub text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutreachBody {
    pub lead_id: String,
    pub channel: String,
    pub tone: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutreachEmailBody {
    pub to: String,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub lead_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpreadsheetCampaignBody {
    pub spreadsheet_url: String,
}

#[derive(Debug, Deserialize)]
pub struct ScraperCampaignBody {
    pub niche: String,
    pub city: String,
    pub service: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentsQuery {
    #[serde(default)]
    pub week_start: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAppointmentBody {
    pub title: String,
    #[serde(rename = "type")]
    pub appointment_type: Option<String>,
    pub start_time: String,
    pub end_time: String,
    pub duration: Option<String>,
    pub meeting_link: Option<String>,
    pub notes: Option<String>,
    pub lead_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAutomationBody {
    pub name: String,
    pub description: Option<String>,
    pub trigger: String,
    pub action: String,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateQuickReplyBody {
    pub title: String,
    pub body: String,
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectIntegrationBody {
    pub api_key: Option<String>,
    pub webhook_url: Option<String>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct IngestQuery {
    pub platform: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IngestBody {
    #[serde(default)]
    pub secret: String,
    #[serde(default)]
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub message: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}
