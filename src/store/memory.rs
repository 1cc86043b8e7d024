use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::types::{
    Activity, Appointment, AppointmentView, Automation, ChatMessage, Conversation,
    ConversationView, Integration, Lead, LeadSummary, NewActivity, NewMessage, QuickReply,
    Sentiment, User,
};

use super::{
    new_id, new_webhook_secret, now_iso, ActivityRepo, AppointmentRepo, AutomationRepo,
    ConversationRepo, IntegrationRepo, LeadRepo, MessageRepo, QuickReplyRepo, StoreError, UserRepo,
};

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    leads: Vec<Lead>,
    conversations: Vec<Conversation>,
    messages: Vec<ChatMessage>,
    activities: Vec<Activity>,
    appointments: Vec<Appointment>,
    automations: Vec<Automation>,
    quick_replies: Vec<QuickReply>,
    integrations: Vec<Integration>,
}

/// In-memory store used by the test suite in place of Postgres.
#[derive(Default)]
pub struct MemStore {
    tables: Mutex<Tables>,
    fail_message_inserts: AtomicBool,
}

impl MemStore {
    /// Makes every subsequent message append fail, to exercise the
    /// abort-before-side-effects path of the inbound pipeline.
    pub fn fail_message_inserts(&self, fail: bool) {
        self.fail_message_inserts.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl UserRepo for MemStore {
    async fn create(&self, user: &User) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().unwrap();
        tables.users.push(user.clone());
        Ok(())
    }

    async fn find_by_api_key(&self, api_key: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.users.iter().find(|u| u.api_key == api_key).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.users.iter().find(|u| u.email == email).cloned())
    }

    async fn update(&self, user: &User) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(existing) = tables.users.iter_mut().find(|u| u.id == user.id) {
            *existing = user.clone();
        }
        Ok(())
    }
}

#[async_trait]
impl LeadRepo for MemStore {
    async fn create(&self, lead: &Lead) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().unwrap();
        tables.leads.push(lead.clone());
        Ok(())
    }

    async fn list(
        &self,
        user_id: &str,
        status: Option<&str>,
    ) -> Result<Vec<LeadSummary>, StoreError> {
        let tables = self.tables.lock().unwrap();
        let mut leads: Vec<&Lead> = tables
            .leads
            .iter()
            .filter(|l| l.user_id == user_id && status.map_or(true, |s| l.status == s))
            .collect();
        leads.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(leads
            .into_iter()
            .map(|lead| LeadSummary {
                conversation_count: tables
                    .conversations
                    .iter()
                    .filter(|c| c.lead_id == lead.id)
                    .count() as i64,
                lead: lead.clone(),
            })
            .collect())
    }

    async fn find(&self, user_id: &str, lead_id: &str) -> Result<Option<Lead>, StoreError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .leads
            .iter()
            .find(|l| l.id == lead_id && l.user_id == user_id)
            .cloned())
    }

    async fn update_status(
        &self,
        user_id: &str,
        lead_id: &str,
        status: &str,
    ) -> Result<Option<Lead>, StoreError> {
        let mut tables = self.tables.lock().unwrap();
        let lead = tables
            .leads
            .iter_mut()
            .find(|l| l.id == lead_id && l.user_id == user_id);
        Ok(lead.map(|l| {
            l.status = status.to_string();
            l.updated_at = now_iso();
            l.clone()
        }))
    }

    async fn delete(&self, user_id: &str, lead_id: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.leads.len();
        tables
            .leads
            .retain(|l| !(l.id == lead_id && l.user_id == user_id));
        Ok(tables.leads.len() < before)
    }

    async fn count(&self, user_id: &str) -> Result<i64, StoreError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.leads.iter().filter(|l| l.user_id == user_id).count() as i64)
    }

    async fn count_by_status(&self, user_id: &str, status: &str) -> Result<i64, StoreError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .leads
            .iter()
            .filter(|l| l.user_id == user_id && l.status == status)
            .count() as i64)
    }

    async fn count_by_source(&self, user_id: &str, source: &str) -> Result<i64, StoreError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .leads
            .iter()
            .filter(|l| l.user_id == user_id && l.source == source)
            .count() as i64)
    }

    async fn count_score_above(&self, user_id: &str, score: i32) -> Result<i64, StoreError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .leads
            .iter()
            .filter(|l| l.user_id == user_id && l.score > score)
            .count() as i64)
    }

    async fn count_score_below(&self, user_id: &str, score: i32) -> Result<i64, StoreError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .leads
            .iter()
            .filter(|l| l.user_id == user_id && l.score < score)
            .count() as i64)
    }

    async fn count_created_since(&self, user_id: &str, since: &str) -> Result<i64, StoreError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .leads
            .iter()
            .filter(|l| l.user_id == user_id && l.created_at.as_str() >= since)
            .count() as i64)
    }
}

#[async_trait]
impl ConversationRepo for MemStore {
    async fn create(&self, conversation: &Conversation) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().unwrap();
        tables.conversations.push(conversation.clone());
        Ok(())
    }

    async fn find(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<Option<Conversation>, StoreError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .conversations
            .iter()
            .find(|c| c.id == conversation_id && c.user_id == user_id)
            .cloned())
    }

    async fn list_views(&self, user_id: &str) -> Result<Vec<ConversationView>, StoreError> {
        let tables = self.tables.lock().unwrap();
        let mut conversations: Vec<&Conversation> = tables
            .conversations
            .iter()
            .filter(|c| c.user_id == user_id)
            .collect();
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        let mut views = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            let Some(lead) = tables.leads.iter().find(|l| l.id == conversation.lead_id) else {
                continue;
            };
            let mut messages: Vec<ChatMessage> = tables
                .messages
                .iter()
                .filter(|m| m.conversation_id == conversation.id)
                .cloned()
                .collect();
            messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            views.push(ConversationView {
                conversation: conversation.clone(),
                lead: lead.clone(),
                messages,
            });
        }
        Ok(views)
    }

    async fn latest_for_lead(&self, lead_id: &str) -> Result<Option<Conversation>, StoreError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .conversations
            .iter()
            .filter(|c| c.lead_id == lead_id)
            .max_by(|a, b| a.updated_at.cmp(&b.updated_at))
            .cloned())
    }

    async fn apply_analysis(
        &self,
        conversation_id: &str,
        sentiment: Sentiment,
        score: i32,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(c) = tables
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
        {
            c.sentiment = sentiment;
            c.score = score;
            c.unread_count += 1;
            c.updated_at = now_iso();
        }
        Ok(())
    }

    async fn touch(&self, conversation_id: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(c) = tables
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
        {
            c.updated_at = now_iso();
        }
        Ok(())
    }

    async fn count(&self, user_id: &str) -> Result<i64, StoreError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .conversations
            .iter()
            .filter(|c| c.user_id == user_id)
            .count() as i64)
    }

    async fn count_by_sentiment(
        &self,
        user_id: &str,
        sentiment: Sentiment,
    ) -> Result<i64, StoreError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .conversations
            .iter()
            .filter(|c| c.user_id == user_id && c.sentiment == sentiment)
            .count() as i64)
    }
}

#[async_trait]
impl MessageRepo for MemStore {
    async fn append(&self, message: NewMessage) -> Result<ChatMessage, StoreError> {
        if self.fail_message_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("message insert failed".to_string()));
        }
        let mut tables = self.tables.lock().unwrap();
        let record = ChatMessage {
            id: new_id(),
            conversation_id: message.conversation_id,
            sender: message.sender,
            text: message.text,
            sentiment: message.sentiment,
            created_at: now_iso(),
        };
        tables.messages.push(record.clone());
        Ok(record)
    }

    async fn list(&self, conversation_id: &str) -> Result<Vec<ChatMessage>, StoreError> {
        let tables = self.tables.lock().unwrap();
        let mut messages: Vec<ChatMessage> = tables
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(messages)
    }

    async fn recent(
        &self,
        conversation_id: &str,
        limit: i64,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let mut messages = MessageRepo::list(self, conversation_id).await?;
        let keep = limit.max(0) as usize;
        if messages.len() > keep {
            messages = messages.split_off(messages.len() - keep);
        }
        Ok(messages)
    }
}

#[async_trait]
impl ActivityRepo for MemStore {
    async fn append(&self, user_id: &str, activity: NewActivity) -> Result<Activity, StoreError> {
        let mut tables = self.tables.lock().unwrap();
        let record = Activity {
            id: new_id(),
            user_id: user_id.to_string(),
            title: activity.title,
            description: activity.description,
            channel: activity.channel,
            status: activity.status,
            created_at: now_iso(),
        };
        tables.activities.push(record.clone());
        Ok(record)
    }

    async fn recent(&self, user_id: &str, limit: i64) -> Result<Vec<Activity>, StoreError> {
        let tables = self.tables.lock().unwrap();
        let mut activities: Vec<Activity> = tables
            .activities
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        activities.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        activities.truncate(limit.max(0) as usize);
        Ok(activities)
    }

    async fn count_by_title(&self, user_id: &str, title: &str) -> Result<i64, StoreError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .activities
            .iter()
            .filter(|a| a.user_id == user_id && a.title == title)
            .count() as i64)
    }
}

#[async_trait]
impl AppointmentRepo for MemStore {
    async fn create(&self, appointment: &Appointment) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().unwrap();
        tables.appointments.push(appointment.clone());
        Ok(())
    }

    async fn list_between(
        &self,
        user_id: &str,
        start: &str,
        end: &str,
    ) -> Result<Vec<AppointmentView>, StoreError> {
        let tables = self.tables.lock().unwrap();
        let mut appointments: Vec<Appointment> = tables
            .appointments
            .iter()
            .filter(|a| {
                a.user_id == user_id
                    && a.start_time.as_str() >= start
                    && a.start_time.as_str() <= end
            })
            .cloned()
            .collect();
        appointments.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        Ok(appointments
            .into_iter()
            .map(|appointment| AppointmentView {
                lead: appointment
                    .lead_id
                    .as_ref()
                    .and_then(|id| tables.leads.iter().find(|l| &l.id == id).cloned()),
                appointment,
            })
            .collect())
    }

    async fn upcoming(
        &self,
        user_id: &str,
        after: &str,
        limit: i64,
    ) -> Result<Vec<AppointmentView>, StoreError> {
        let tables = self.tables.lock().unwrap();
        let mut appointments: Vec<Appointment> = tables
            .appointments
            .iter()
            .filter(|a| a.user_id == user_id && a.start_time.as_str() >= after)
            .cloned()
            .collect();
        appointments.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        appointments.truncate(limit.max(0) as usize);
        Ok(appointments
            .into_iter()
            .map(|appointment| AppointmentView {
                lead: appointment
                    .lead_id
                    .as_ref()
                    .and_then(|id| tables.leads.iter().find(|l| &l.id == id).cloned()),
                appointment,
            })
            .collect())
    }

    async fn delete(&self, user_id: &str, appointment_id: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.appointments.len();
        tables
            .appointments
            .retain(|a| !(a.id == appointment_id && a.user_id == user_id));
        Ok(tables.appointments.len() < before)
    }

    async fn count_between(
        &self,
        user_id: &str,
        start: &str,
        end: &str,
    ) -> Result<i64, StoreError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .appointments
            .iter()
            .filter(|a| {
                a.user_id == user_id
                    && a.start_time.as_str() >= start
                    && a.start_time.as_str() <= end
            })
            .count() as i64)
    }
}

#[async_trait]
impl AutomationRepo for MemStore {
    async fn create(&self, automation: &Automation) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().unwrap();
        tables.automations.push(automation.clone());
        Ok(())
    }

    async fn create_many(&self, automations: &[Automation]) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().unwrap();
        tables.automations.extend_from_slice(automations);
        Ok(())
    }

    async fn list(&self, user_id: &str) -> Result<Vec<Automation>, StoreError> {
        let tables = self.tables.lock().unwrap();
        let mut automations: Vec<Automation> = tables
            .automations
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        automations.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(automations)
    }

    async fn set_active(
        &self,
        user_id: &str,
        automation_id: &str,
        active: bool,
    ) -> Result<Option<Automation>, StoreError> {
        let mut tables = self.tables.lock().unwrap();
        let automation = tables
            .automations
            .iter_mut()
            .find(|a| a.id == automation_id && a.user_id == user_id);
        Ok(automation.map(|a| {
            a.active = active;
            a.clone()
        }))
    }

    async fn find(
        &self,
        user_id: &str,
        automation_id: &str,
    ) -> Result<Option<Automation>, StoreError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .automations
            .iter()
            .find(|a| a.id == automation_id && a.user_id == user_id)
            .cloned())
    }

    async fn delete(&self, user_id: &str, automation_id: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.automations.len();
        tables
            .automations
            .retain(|a| !(a.id == automation_id && a.user_id == user_id));
        Ok(tables.automations.len() < before)
    }

    async fn count(&self, user_id: &str) -> Result<i64, StoreError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .automations
            .iter()
            .filter(|a| a.user_id == user_id)
            .count() as i64)
    }
}

#[async_trait]
impl QuickReplyRepo for MemStore {
    async fn create(&self, reply: &QuickReply) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().unwrap();
        tables.quick_replies.push(reply.clone());
        Ok(())
    }

    async fn create_many(&self, replies: &[QuickReply]) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().unwrap();
        tables.quick_replies.extend_from_slice(replies);
        Ok(())
    }

    async fn list(&self, user_id: &str) -> Result<Vec<QuickReply>, StoreError> {
        let tables = self.tables.lock().unwrap();
        let mut replies: Vec<QuickReply> = tables
            .quick_replies
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        replies.sort_by(|a, b| {
            b.usage_count
                .cmp(&a.usage_count)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(replies)
    }

    async fn delete(&self, user_id: &str, reply_id: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.quick_replies.len();
        tables
            .quick_replies
            .retain(|r| !(r.id == reply_id && r.user_id == user_id));
        Ok(tables.quick_replies.len() < before)
    }

    async fn increment_usage(
        &self,
        user_id: &str,
        reply_id: &str,
    ) -> Result<Option<QuickReply>, StoreError> {
        let mut tables = self.tables.lock().unwrap();
        let reply = tables
            .quick_replies
            .iter_mut()
            .find(|r| r.id == reply_id && r.user_id == user_id);
        Ok(reply.map(|r| {
            r.usage_count += 1;
            r.clone()
        }))
    }

    async fn count(&self, user_id: &str) -> Result<i64, StoreError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .quick_replies
            .iter()
            .filter(|r| r.user_id == user_id)
            .count() as i64)
    }
}

#[async_trait]
impl IntegrationRepo for MemStore {
    async fn create_many(&self, integrations: &[Integration]) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().unwrap();
        for integration in integrations {
            let exists = tables
                .integrations
                .iter()
                .any(|i| i.user_id == integration.user_id && i.platform == integration.platform);
            if !exists {
                tables.integrations.push(integration.clone());
            }
        }
        Ok(())
    }

    async fn list(&self, user_id: &str) -> Result<Vec<Integration>, StoreError> {
        let tables = self.tables.lock().unwrap();
        let mut integrations: Vec<Integration> = tables
            .integrations
            .iter()
            .filter(|i| i.user_id == user_id)
            .cloned()
            .collect();
        integrations.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.platform.cmp(&b.platform))
        });
        Ok(integrations)
    }

    async fn find(
        &self,
        user_id: &str,
        integration_id: &str,
    ) -> Result<Option<Integration>, StoreError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .integrations
            .iter()
            .find(|i| i.id == integration_id && i.user_id == user_id)
            .cloned())
    }

    async fn find_by_platform(
        &self,
        user_id: &str,
        platform: &str,
    ) -> Result<Option<Integration>, StoreError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .integrations
            .iter()
            .find(|i| i.user_id == user_id && i.platform == platform)
            .cloned())
    }

    async fn find_connected_by_secret(
        &self,
        secret: &str,
        platform: &str,
    ) -> Result<Option<Integration>, StoreError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .integrations
            .iter()
            .find(|i| {
                i.webhook_secret == secret && i.platform == platform && i.status == "connected"
            })
            .cloned())
    }

    async fn connect(
        &self,
        user_id: &str,
        platform: &str,
        api_key: &str,
        webhook_url: &str,
        metadata: &Value,
    ) -> Result<Integration, StoreError> {
        let mut tables = self.tables.lock().unwrap();
        let now = now_iso();
        if let Some(i) = tables
            .integrations
            .iter_mut()
            .find(|i| i.user_id == user_id && i.platform == platform)
        {
            i.status = "connected".to_string();
            i.api_key = api_key.to_string();
            i.webhook_url = webhook_url.to_string();
            i.metadata = metadata.clone();
            i.connected_at = Some(now);
            return Ok(i.clone());
        }
        let integration = Integration {
            id: new_id(),
            user_id: user_id.to_string(),
            platform: platform.to_string(),
            status: "connected".to_string(),
            api_key: api_key.to_string(),
            webhook_url: webhook_url.to_string(),
            webhook_secret: new_webhook_secret(),
            metadata: metadata.clone(),
            connected_at: Some(now.clone()),
            created_at: now,
        };
        tables.integrations.push(integration.clone());
        Ok(integration)
    }

    async fn upsert_status(
        &self,
        user_id: &str,
        platform: &str,
        status: &str,
    ) -> Result<Integration, StoreError> {
        let mut tables = self.tables.lock().unwrap();
        let now = now_iso();
        let connected_at = (status == "connected").then(|| now.clone());
        if let Some(i) = tables
            .integrations
            .iter_mut()
            .find(|i| i.user_id == user_id && i.platform == platform)
        {
            i.status = status.to_string();
            i.connected_at = connected_at;
            return Ok(i.clone());
        }
        let integration = Integration {
            id: new_id(),
            user_id: user_id.to_string(),
            platform: platform.to_string(),
            status: status.to_string(),
            api_key: String::new(),
            webhook_url: String::new(),
            webhook_secret: new_webhook_secret(),
            metadata: Value::Object(Default::default()),
            connected_at,
            created_at: now,
        };
        tables.integrations.push(integration.clone());
        Ok(integration)
    }

    async fn disconnect(
        &self,
        user_id: &str,
        integration_id: &str,
    ) -> Result<Option<Integration>, StoreError> {
        let mut tables = self.tables.lock().unwrap();
        let integration = tables
            .integrations
            .iter_mut()
            .find(|i| i.id == integration_id && i.user_id == user_id);
        Ok(integration.map(|i| {
            i.status = "disconnected".to_string();
            i.api_key = String::new();
            i.webhook_url = String::new();
            i.metadata = Value::Object(Default::default());
            i.connected_at = None;
            i.clone()
        }))
    }

    async fn set_status(
        &self,
        user_id: &str,
        integration_id: &str,
        status: &str,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(i) = tables
            .integrations
            .iter_mut()
            .find(|i| i.id == integration_id && i.user_id == user_id)
        {
            i.status = status.to_string();
        }
        Ok(())
    }
}
