use async_trait::async_trait;
use serde_json::Value;
use sqlx::{postgres::PgRow, PgPool, Row};

use crate::types::{
    Activity, Appointment, AppointmentView, Automation, ChatMessage, Conversation,
    ConversationView, Integration, Lead, LeadSummary, NewActivity, NewMessage, QuickReply, Sender,
    Sentiment, User,
};

use super::{
    new_id, new_webhook_secret, now_iso, ActivityRepo, AppointmentRepo, AutomationRepo,
    ConversationRepo, IntegrationRepo, LeadRepo, MessageRepo, QuickReplyRepo, StoreError, UserRepo,
};

/// Postgres-backed store; one pool shared across every repository trait.
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> PgStore {
        PgStore { db }
    }
}

fn json_text(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
}

fn parse_json_text(value: &str) -> Value {
    serde_json::from_str(value).unwrap_or_else(|_| Value::Object(Default::default()))
}

fn parse_user_row(row: PgRow) -> User {
    User {
        id: row.get("id"),
        api_key: row.get("api_key"),
        email: row.get("email"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        business_name: row.get("business_name"),
        industry: row.get("industry"),
        business_hours: row.get("business_hours"),
        team_size: row.get("team_size"),
        onboarding_complete: row.get("onboarding_complete"),
        created_at: row.get("created_at"),
    }
}

fn parse_lead_row(row: &PgRow) -> Lead {
    Lead {
        id: row.get("id"),
        user_id: row.get("user_id"),
        name: row.get("name"),
        email: row.get("email"),
        phone: row.get("phone"),
        source: row.get("source"),
        status: row.get("status"),
        score: row.get("score"),
        sentiment: Sentiment::parse_or_neutral(&row.get::<String, _>("sentiment")),
        tags: row.get("tags"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn parse_conversation_row(row: &PgRow) -> Conversation {
    Conversation {
        id: row.get("id"),
        user_id: row.get("user_id"),
        lead_id: row.get("lead_id"),
        channel: row.get("channel"),
        sentiment: Sentiment::parse_or_neutral(&row.get::<String, _>("sentiment")),
        score: row.get("score"),
        unread_count: row.get("unread_count"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn parse_message_row(row: &PgRow) -> ChatMessage {
    ChatMessage {
        id: row.get("id"),
        conversation_id: row.get("conversation_id"),
        sender: Sender::parse_or_agent(&row.get::<String, _>("sender")),
        text: row.get("text"),
        sentiment: row
            .get::<Option<String>, _>("sentiment")
            .map(|s| Sentiment::parse_or_neutral(&s)),
        created_at: row.get("created_at"),
    }
}

fn parse_activity_row(row: &PgRow) -> Activity {
    Activity {
        id: row.get("id"),
        user_id: row.get("user_id"),
        title: row.get("title"),
        description: row.get("description"),
        channel: row.get("channel"),
        status: row.get("status"),
        created_at: row.get("created_at"),
    }
}

fn parse_appointment_row(row: &PgRow) -> Appointment {
    Appointment {
        id: row.get("id"),
        user_id: row.get("user_id"),
        lead_id: row.get("lead_id"),
        title: row.get("title"),
        appointment_type: row.get("appointment_type"),
        start_time: row.get("start_time"),
        end_time: row.get("end_time"),
        duration: row.get("duration"),
        meeting_link: row.get("meeting_link"),
        notes: row.get("notes"),
        created_at: row.get("created_at"),
    }
}

fn parse_automation_row(row: &PgRow) -> Automation {
    Automation {
        id: row.get("id"),
        user_id: row.get("user_id"),
        name: row.get("name"),
        description: row.get("description"),
        trigger: row.get("trigger"),
        action: row.get("action"),
        icon: row.get("icon"),
        color: row.get("color"),
        active: row.get("active"),
        runs: row.get("runs"),
        success_rate: row.get("success_rate"),
        created_at: row.get("created_at"),
    }
}

fn parse_quick_reply_row(row: &PgRow) -> QuickReply {
    QuickReply {
        id: row.get("id"),
        user_id: row.get("user_id"),
        title: row.get("title"),
        body: row.get("body"),
        category: row.get("category"),
        usage_count: row.get("usage_count"),
        created_at: row.get("created_at"),
    }
}

fn parse_integration_row(row: &PgRow) -> Integration {
    Integration {
        id: row.get("id"),
        user_id: row.get("user_id"),
        platform: row.get("platform"),
        status: row.get("status"),
        api_key: row.get("api_key"),
        webhook_url: row.get("webhook_url"),
        webhook_secret: row.get("webhook_secret"),
        metadata: parse_json_text(&row.get::<String, _>("metadata")),
        connected_at: row.get("connected_at"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl UserRepo for PgStore {
    async fn create(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO users (id, api_key, email, first_name, last_name, business_name, industry, business_hours, team_size, onboarding_complete, created_at) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)",
        )
        .bind(&user.id)
        .bind(&user.api_key)
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.business_name)
        .bind(&user.industry)
        .bind(&user.business_hours)
        .bind(&user.team_size)
        .bind(user.onboarding_complete)
        .bind(&user.created_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn find_by_api_key(&self, api_key: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query("SELECT * FROM users WHERE api_key = $1")
            .bind(api_key)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(parse_user_row))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(parse_user_row))
    }

    async fn update(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE users SET first_name = $1, last_name = $2, business_name = $3, industry = $4, \
             business_hours = $5, team_size = $6, onboarding_complete = $7 WHERE id = $8",
        )
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.business_name)
        .bind(&user.industry)
        .bind(&user.business_hours)
        .bind(&user.team_size)
        .bind(user.onboarding_complete)
        .bind(&user.id)
        .execute(&self.db)
        .await?;
        Ok(())
    }
}

async fn count_where(
    db: &PgPool,
    sql: &str,
    binds: &[&str],
) -> Result<i64, StoreError> {
    let mut query = sqlx::query(sql);
    for bind in binds {
        query = query.bind(*bind);
    }
    let row = query.fetch_one(db).await?;
    Ok(row.get::<i64, _>(0))
}

#[async_trait]
impl LeadRepo for PgStore {
    async fn create(&self, lead: &Lead) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO leads (id, user_id, name, email, phone, source, status, score, sentiment, tags, created_at, updated_at) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)",
        )
        .bind(&lead.id)
        .bind(&lead.user_id)
        .bind(&lead.name)
        .bind(&lead.email)
        .bind(&lead.phone)
        .bind(&lead.source)
        .bind(&lead.status)
        .bind(lead.score)
        .bind(lead.sentiment.as_str())
        .bind(&lead.tags)
        .bind(&lead.created_at)
        .bind(&lead.updated_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn list(
        &self,
        user_id: &str,
        status: Option<&str>,
    ) -> Result<Vec<LeadSummary>, StoreError> {
        let sql = if status.is_some() {
            "SELECT l.*, COUNT(c.id) AS conversation_count FROM leads l \
             LEFT JOIN conversations c ON c.lead_id = l.id \
             WHERE l.user_id = $1 AND l.status = $2 \
             GROUP BY l.id ORDER BY l.created_at DESC"
        } else {
            "SELECT l.*, COUNT(c.id) AS conversation_count FROM leads l \
             LEFT JOIN conversations c ON c.lead_id = l.id \
             WHERE l.user_id = $1 \
             GROUP BY l.id ORDER BY l.created_at DESC"
        };
        let mut query = sqlx::query(sql).bind(user_id);
        if let Some(status) = status {
            query = query.bind(status);
        }
        let rows = query.fetch_all(&self.db).await?;
        Ok(rows
            .iter()
            .map(|row| LeadSummary {
                lead: parse_lead_row(row),
                conversation_count: row.get("conversation_count"),
            })
            .collect())
    }

    async fn find(&self, user_id: &str, lead_id: &str) -> Result<Option<Lead>, StoreError> {
        let row = sqlx::query("SELECT * FROM leads WHERE id = $1 AND user_id = $2")
            .bind(lead_id)
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.as_ref().map(parse_lead_row))
    }

    async fn update_status(
        &self,
        user_id: &str,
        lead_id: &str,
        status: &str,
    ) -> Result<Option<Lead>, StoreError> {
        let row = sqlx::query(
            "UPDATE leads SET status = $1, updated_at = $2 WHERE id = $3 AND user_id = $4 RETURNING *",
        )
        .bind(status)
        .bind(now_iso())
        .bind(lead_id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.as_ref().map(parse_lead_row))
    }

    async fn delete(&self, user_id: &str, lead_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM leads WHERE id = $1 AND user_id = $2")
            .bind(lead_id)
            .bind(user_id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count(&self, user_id: &str) -> Result<i64, StoreError> {
        count_where(
            &self.db,
            "SELECT COUNT(*) FROM leads WHERE user_id = $1",
            &[user_id],
        )
        .await
    }

    async fn count_by_status(&self, user_id: &str, status: &str) -> Result<i64, StoreError> {
        count_where(
            &self.db,
            "SELECT COUNT(*) FROM leads WHERE user_id = $1 AND status = $2",
            &[user_id, status],
        )
        .await
    }

    async fn count_by_source(&self, user_id: &str, source: &str) -> Result<i64, StoreError> {
        count_where(
            &self.db,
            "SELECT COUNT(*) FROM leads WHERE user_id = $1 AND source = $2",
            &[user_id, source],
        )
        .await
    }

    async fn count_score_above(&self, user_id: &str, score: i32) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) FROM leads WHERE user_id = $1 AND score > $2")
            .bind(user_id)
            .bind(score)
            .fetch_one(&self.db)
            .await?;
        Ok(row.get::<i64, _>(0))
    }

    async fn count_score_below(&self, user_id: &str, score: i32) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) FROM leads WHERE user_id = $1 AND score < $2")
            .bind(user_id)
            .bind(score)
            .fetch_one(&self.db)
            .await?;
        Ok(row.get::<i64, _>(0))
    }

    async fn count_created_since(&self, user_id: &str, since: &str) -> Result<i64, StoreError> {
        count_where(
            &self.db,
            "SELECT COUNT(*) FROM leads WHERE user_id = $1 AND created_at >= $2",
            &[user_id, since],
        )
        .await
    }
}

#[async_trait]
impl ConversationRepo for PgStore {
    async fn create(&self, conversation: &Conversation) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO conversations (id, user_id, lead_id, channel, sentiment, score, unread_count, created_at, updated_at) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)",
        )
        .bind(&conversation.id)
        .bind(&conversation.user_id)
        .bind(&conversation.lead_id)
        .bind(&conversation.channel)
        .bind(conversation.sentiment.as_str())
        .bind(conversation.score)
        .bind(conversation.unread_count)
        .bind(&conversation.created_at)
        .bind(&conversation.updated_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn find(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<Option<Conversation>, StoreError> {
        let row = sqlx::query("SELECT * FROM conversations WHERE id = $1 AND user_id = $2")
            .bind(conversation_id)
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.as_ref().map(parse_conversation_row))
    }

    async fn list_views(&self, user_id: &str) -> Result<Vec<ConversationView>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM conversations WHERE user_id = $1 ORDER BY updated_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        let mut views = Vec::with_capacity(rows.len());
        for row in &rows {
            let conversation = parse_conversation_row(row);
            let lead_row = sqlx::query("SELECT * FROM leads WHERE id = $1")
                .bind(&conversation.lead_id)
                .fetch_optional(&self.db)
                .await?;
            let Some(lead_row) = lead_row else {
                continue;
            };
            let messages = MessageRepo::list(self, &conversation.id).await?;
            views.push(ConversationView {
                conversation,
                lead: parse_lead_row(&lead_row),
                messages,
            });
        }
        Ok(views)
    }

    async fn latest_for_lead(&self, lead_id: &str) -> Result<Option<Conversation>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM conversations WHERE lead_id = $1 ORDER BY updated_at DESC LIMIT 1",
        )
        .bind(lead_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.as_ref().map(parse_conversation_row))
    }

    async fn apply_analysis(
        &self,
        conversation_id: &str,
        sentiment: Sentiment,
        score: i32,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE conversations SET sentiment = $1, score = $2, unread_count = unread_count + 1, updated_at = $3 WHERE id = $4",
        )
        .bind(sentiment.as_str())
        .bind(score)
        .bind(now_iso())
        .bind(conversation_id)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn touch(&self, conversation_id: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE conversations SET updated_at = $1 WHERE id = $2")
            .bind(now_iso())
            .bind(conversation_id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn count(&self, user_id: &str) -> Result<i64, StoreError> {
        count_where(
            &self.db,
            "SELECT COUNT(*) FROM conversations WHERE user_id = $1",
            &[user_id],
        )
        .await
    }

    async fn count_by_sentiment(
        &self,
        user_id: &str,
        sentiment: Sentiment,
    ) -> Result<i64, StoreError> {
        count_where(
            &self.db,
            "SELECT COUNT(*) FROM conversations WHERE user_id = $1 AND sentiment = $2",
            &[user_id, sentiment.as_str()],
        )
        .await
    }
}

#[async_trait]
impl MessageRepo for PgStore {
    async fn append(&self, message: NewMessage) -> Result<ChatMessage, StoreError> {
        let record = ChatMessage {
            id: new_id(),
            conversation_id: message.conversation_id,
            sender: message.sender,
            text: message.text,
            sentiment: message.sentiment,
            created_at: now_iso(),
        };
        sqlx::query(
            "INSERT INTO messages (id, conversation_id, sender, text, sentiment, created_at) \
             VALUES ($1,$2,$3,$4,$5,$6)",
        )
        .bind(&record.id)
        .bind(&record.conversation_id)
        .bind(record.sender.as_str())
        .bind(&record.text)
        .bind(record.sentiment.map(|s| s.as_str()))
        .bind(&record.created_at)
        .execute(&self.db)
        .await?;
        Ok(record)
    }

    async fn list(&self, conversation_id: &str) -> Result<Vec<ChatMessage>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM messages WHERE conversation_id = $1 ORDER BY created_at ASC",
        )
        .bind(conversation_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.iter().map(parse_message_row).collect())
    }

    async fn recent(
        &self,
        conversation_id: &str,
        limit: i64,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM messages WHERE conversation_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(conversation_id)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;
        let mut messages = rows.iter().map(parse_message_row).collect::<Vec<_>>();
        messages.reverse();
        Ok(messages)
    }
}

#[async_trait]
impl ActivityRepo for PgStore {
    async fn append(&self, user_id: &str, activity: NewActivity) -> Result<Activity, StoreError> {
        let record = Activity {
            id: new_id(),
            user_id: user_id.to_string(),
            title: activity.title,
            description: activity.description,
            channel: activity.channel,
            status: activity.status,
            created_at: now_iso(),
        };
        sqlx::query(
            "INSERT INTO activities (id, user_id, title, description, channel, status, created_at) \
             VALUES ($1,$2,$3,$4,$5,$6,$7)",
        )
        .bind(&record.id)
        .bind(&record.user_id)
        .bind(&record.title)
        .bind(&record.description)
        .bind(&record.channel)
        .bind(&record.status)
        .bind(&record.created_at)
        .execute(&self.db)
        .await?;
        Ok(record)
    }

    async fn recent(&self, user_id: &str, limit: i64) -> Result<Vec<Activity>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM activities WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.iter().map(parse_activity_row).collect())
    }

    async fn count_by_title(&self, user_id: &str, title: &str) -> Result<i64, StoreError> {
        count_where(
            &self.db,
            "SELECT COUNT(*) FROM activities WHERE user_id = $1 AND title = $2",
            &[user_id, title],
        )
        .await
    }
}

impl PgStore {
    async fn appointment_views(&self, rows: Vec<PgRow>) -> Result<Vec<AppointmentView>, StoreError> {
        let mut views = Vec::with_capacity(rows.len());
        for row in &rows {
            let appointment = parse_appointment_row(row);
            let lead = match &appointment.lead_id {
                Some(lead_id) => sqlx::query("SELECT * FROM leads WHERE id = $1")
                    .bind(lead_id)
                    .fetch_optional(&self.db)
                    .await?
                    .as_ref()
                    .map(parse_lead_row),
                None => None,
            };
            views.push(AppointmentView { appointment, lead });
        }
        Ok(views)
    }
}

#[async_trait]
impl AppointmentRepo for PgStore {
    async fn create(&self, appointment: &Appointment) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO appointments (id, user_id, lead_id, title, appointment_type, start_time, end_time, duration, meeting_link, notes, created_at) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)",
        )
        .bind(&appointment.id)
        .bind(&appointment.user_id)
        .bind(&appointment.lead_id)
        .bind(&appointment.title)
        .bind(&appointment.appointment_type)
        .bind(&appointment.start_time)
        .bind(&appointment.end_time)
        .bind(&appointment.duration)
        .bind(&appointment.meeting_link)
        .bind(&appointment.notes)
        .bind(&appointment.created_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn list_between(
        &self,
        user_id: &str,
        start: &str,
        end: &str,
    ) -> Result<Vec<AppointmentView>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM appointments WHERE user_id = $1 AND start_time >= $2 AND start_time <= $3 ORDER BY start_time ASC",
        )
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.db)
        .await?;
        self.appointment_views(rows).await
    }

    async fn upcoming(
        &self,
        user_id: &str,
        after: &str,
        limit: i64,
    ) -> Result<Vec<AppointmentView>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM appointments WHERE user_id = $1 AND start_time >= $2 ORDER BY start_time ASC LIMIT $3",
        )
        .bind(user_id)
        .bind(after)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;
        self.appointment_views(rows).await
    }

    async fn delete(&self, user_id: &str, appointment_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM appointments WHERE id = $1 AND user_id = $2")
            .bind(appointment_id)
            .bind(user_id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_between(
        &self,
        user_id: &str,
        start: &str,
        end: &str,
    ) -> Result<i64, StoreError> {
        count_where(
            &self.db,
            "SELECT COUNT(*) FROM appointments WHERE user_id = $1 AND start_time >= $2 AND start_time <= $3",
            &[user_id, start, end],
        )
        .await
    }
}

#[async_trait]
impl AutomationRepo for PgStore {
    async fn create(&self, automation: &Automation) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO automations (id, user_id, name, description, trigger, action, icon, color, active, runs, success_rate, created_at) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)",
        )
        .bind(&automation.id)
        .bind(&automation.user_id)
        .bind(&automation.name)
        .bind(&automation.description)
        .bind(&automation.trigger)
        .bind(&automation.action)
        .bind(&automation.icon)
        .bind(&automation.color)
        .bind(automation.active)
        .bind(automation.runs)
        .bind(automation.success_rate)
        .bind(&automation.created_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn create_many(&self, automations: &[Automation]) -> Result<(), StoreError> {
        for automation in automations {
            AutomationRepo::create(self, automation).await?;
        }
        Ok(())
    }

    async fn list(&self, user_id: &str) -> Result<Vec<Automation>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM automations WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.iter().map(parse_automation_row).collect())
    }

    async fn set_active(
        &self,
        user_id: &str,
        automation_id: &str,
        active: bool,
    ) -> Result<Option<Automation>, StoreError> {
        let row = sqlx::query(
            "UPDATE automations SET active = $1 WHERE id = $2 AND user_id = $3 RETURNING *",
        )
        .bind(active)
        .bind(automation_id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.as_ref().map(parse_automation_row))
    }

    async fn find(
        &self,
        user_id: &str,
        automation_id: &str,
    ) -> Result<Option<Automation>, StoreError> {
        let row = sqlx::query("SELECT * FROM automations WHERE id = $1 AND user_id = $2")
            .bind(automation_id)
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.as_ref().map(parse_automation_row))
    }

    async fn delete(&self, user_id: &str, automation_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM automations WHERE id = $1 AND user_id = $2")
            .bind(automation_id)
            .bind(user_id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count(&self, user_id: &str) -> Result<i64, StoreError> {
        count_where(
            &self.db,
            "SELECT COUNT(*) FROM automations WHERE user_id = $1",
            &[user_id],
        )
        .await
    }
}

#[async_trait]
impl QuickReplyRepo for PgStore {
    async fn create(&self, reply: &QuickReply) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO quick_replies (id, user_id, title, body, category, usage_count, created_at) \
             VALUES ($1,$2,$3,$4,$5,$6,$7)",
        )
        .bind(&reply.id)
        .bind(&reply.user_id)
        .bind(&reply.title)
        .bind(&reply.body)
        .bind(&reply.category)
        .bind(reply.usage_count)
        .bind(&reply.created_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn create_many(&self, replies: &[QuickReply]) -> Result<(), StoreError> {
        for reply in replies {
            QuickReplyRepo::create(self, reply).await?;
        }
        Ok(())
    }

    async fn list(&self, user_id: &str) -> Result<Vec<QuickReply>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM quick_replies WHERE user_id = $1 ORDER BY usage_count DESC, created_at ASC",
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.iter().map(parse_quick_reply_row).collect())
    }

    async fn delete(&self, user_id: &str, reply_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM quick_replies WHERE id = $1 AND user_id = $2")
            .bind(reply_id)
            .bind(user_id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn increment_usage(
        &self,
        user_id: &str,
        reply_id: &str,
    ) -> Result<Option<QuickReply>, StoreError> {
        let row = sqlx::query(
            "UPDATE quick_replies SET usage_count = usage_count + 1 WHERE id = $1 AND user_id = $2 RETURNING *",
        )
        .bind(reply_id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.as_ref().map(parse_quick_reply_row))
    }

    async fn count(&self, user_id: &str) -> Result<i64, StoreError> {
        count_where(
            &self.db,
            "SELECT COUNT(*) FROM quick_replies WHERE user_id = $1",
            &[user_id],
        )
        .await
    }
}

#[async_trait]
impl IntegrationRepo for PgStore {
    async fn create_many(&self, integrations: &[Integration]) -> Result<(), StoreError> {
        for integration in integrations {
            sqlx::query(
                "INSERT INTO integrations (id, user_id, platform, status, api_key, webhook_url, webhook_secret, metadata, connected_at, created_at) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10) ON CONFLICT (user_id, platform) DO NOTHING",
            )
            .bind(&integration.id)
            .bind(&integration.user_id)
            .bind(&integration.platform)
            .bind(&integration.status)
            .bind(&integration.api_key)
            .bind(&integration.webhook_url)
            .bind(&integration.webhook_secret)
            .bind(json_text(&integration.metadata))
            .bind(&integration.connected_at)
            .bind(&integration.created_at)
            .execute(&self.db)
            .await?;
        }
        Ok(())
    }

    async fn list(&self, user_id: &str) -> Result<Vec<Integration>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM integrations WHERE user_id = $1 ORDER BY created_at ASC, platform ASC",
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.iter().map(parse_integration_row).collect())
    }

    async fn find(
        &self,
        user_id: &str,
        integration_id: &str,
    ) -> Result<Option<Integration>, StoreError> {
        let row = sqlx::query("SELECT * FROM integrations WHERE id = $1 AND user_id = $2")
            .bind(integration_id)
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.as_ref().map(parse_integration_row))
    }

    async fn find_by_platform(
        &self,
        user_id: &str,
        platform: &str,
    ) -> Result<Option<Integration>, StoreError> {
        let row = sqlx::query("SELECT * FROM integrations WHERE user_id = $1 AND platform = $2")
            .bind(user_id)
            .bind(platform)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.as_ref().map(parse_integration_row))
    }

    async fn find_connected_by_secret(
        &self,
        secret: &str,
        platform: &str,
    ) -> Result<Option<Integration>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM integrations WHERE webhook_secret = $1 AND platform = $2 AND status = 'connected'",
        )
        .bind(secret)
        .bind(platform)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.as_ref().map(parse_integration_row))
    }

    async fn connect(
        &self,
        user_id: &str,
        platform: &str,
        api_key: &str,
        webhook_url: &str,
        metadata: &Value,
    ) -> Result<Integration, StoreError> {
        let now = now_iso();
        let row = sqlx::query(
            "INSERT INTO integrations (id, user_id, platform, status, api_key, webhook_url, webhook_secret, metadata, connected_at, created_at) \
             VALUES ($1,$2,$3,'connected',$4,$5,$6,$7,$8,$8) \
             ON CONFLICT (user_id, platform) DO UPDATE SET status = 'connected', api_key = $4, webhook_url = $5, metadata = $7, connected_at = $8 \
             RETURNING *",
        )
        .bind(new_id())
        .bind(user_id)
        .bind(platform)
        .bind(api_key)
        .bind(webhook_url)
        .bind(new_webhook_secret())
        .bind(json_text(metadata))
        .bind(&now)
        .fetch_one(&self.db)
        .await?;
        Ok(parse_integration_row(&row))
    }

    async fn upsert_status(
        &self,
        user_id: &str,
        platform: &str,
        status: &str,
    ) -> Result<Integration, StoreError> {
        let now = now_iso();
        let connected_at = (status == "connected").then(|| now.clone());
        let row = sqlx::query(
            "INSERT INTO integrations (id, user_id, platform, status, webhook_secret, connected_at, created_at) \
             VALUES ($1,$2,$3,$4,$5,$6,$7) \
             ON CONFLICT (user_id, platform) DO UPDATE SET status = $4, connected_at = $6 \
             RETURNING *",
        )
        .bind(new_id())
        .bind(user_id)
        .bind(platform)
        .bind(status)
        .bind(new_webhook_secret())
        .bind(&connected_at)
        .bind(&now)
        .fetch_one(&self.db)
        .await?;
        Ok(parse_integration_row(&row))
    }

    async fn disconnect(
        &self,
        user_id: &str,
        integration_id: &str,
    ) -> Result<Option<Integration>, StoreError> {
        let row = sqlx::query(
            "UPDATE integrations SET status = 'disconnected', api_key = '', webhook_url = '', metadata = '{}', connected_at = NULL \
             WHERE id = $1 AND user_id = $2 RETURNING *",
        )
        .bind(integration_id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.as_ref().map(parse_integration_row))
    }

    async fn set_status(
        &self,
        user_id: &str,
        integration_id: &str,
        status: &str,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE integrations SET status = $1 WHERE id = $2 AND user_id = $3")
            .bind(status)
            .bind(integration_id)
            .bind(user_id)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}
