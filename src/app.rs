use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
    Json, Router,
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Datelike, Duration, NaiveDate, Utc};
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::ai::GeminiClient;
use crate::config::Config;
use crate::pipeline::{Pipeline, PipelineError};
use crate::store::{new_id, new_webhook_secret, now_iso, Repos, StoreError};
use crate::types::*;

const PLATFORMS: [&str; 7] = [
    "whatsapp",
    "instagram",
    "gmail",
    "calendar",
    "website_forms",
    "make_webhook",
    "make_scraper_webhook",
];

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("{0}")]
    NotFound(&'static str),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Upstream(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> ApiError {
        match err {
            PipelineError::ConversationNotFound => ApiError::NotFound("conversation not found"),
            PipelineError::LeadNotFound => ApiError::NotFound("lead not found"),
            PipelineError::Store(err) => ApiError::Store(err),
            PipelineError::Generation(err) => ApiError::Upstream(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, Json(json!({ "error": msg }))).into_response()
            }
            ApiError::NotFound(msg) => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": msg }))).into_response()
            }
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response()
            }
            ApiError::Upstream(msg) => (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "success": false, "message": msg })),
            )
                .into_response(),
            ApiError::Store(err) => {
                error!(error = %err, "storage failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal server error" })),
                )
                    .into_response()
            }
        }
    }
}

async fn auth_user(state: &AppState, headers: &HeaderMap) -> Result<User, ApiError> {
    let api_key = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(ApiError::Unauthorized("missing x-api-key header"))?;
    state
        .repos
        .users
        .find_by_api_key(api_key)
        .await?
        .ok_or(ApiError::Unauthorized("invalid api key"))
}

fn pipeline(state: &AppState) -> Pipeline {
    Pipeline::new(state.repos.clone(), state.assistant.clone())
}

async fn log_activity(state: &AppState, user_id: &str, activity: NewActivity) {
    if let Err(err) = state.repos.activities.append(user_id, activity).await {
        warn!(error = %err, "failed to append activity");
    }
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

// ---- health ----

async fn health() -> impl IntoResponse {
    Json(json!({ "ok": true, "now": now_iso() }))
}

// ---- account / onboarding ----

async fn create_account(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateAccountBody>,
) -> Result<Response, ApiError> {
    let email = body.email.trim().to_ascii_lowercase();
    if email.is_empty() {
        return Err(ApiError::BadRequest("email is required".to_string()));
    }
    if state.repos.users.find_by_email(&email).await?.is_some() {
        return Ok((
            StatusCode::CONFLICT,
            Json(json!({ "error": "email already registered" })),
        )
            .into_response());
    }
    let user = User {
        id: new_id(),
        api_key: new_id(),
        email,
        first_name: body.first_name,
        last_name: body.last_name,
        business_name: String::new(),
        industry: String::new(),
        business_hours: String::new(),
        team_size: String::new(),
        onboarding_complete: false,
        created_at: now_iso(),
    };
    state.repos.users.create(&user).await?;
    Ok((StatusCode::CREATED, Json(json!({ "user": user }))).into_response())
}

async fn get_account(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let user = auth_user(&state, &headers).await?;
    Ok(Json(json!({ "user": user })).into_response())
}

async fn patch_account(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<PatchAccountBody>,
) -> Result<Response, ApiError> {
    let mut user = auth_user(&state, &headers).await?;
    if let Some(business_name) = body.business_name {
        user.business_name = business_name;
    }
    if let Some(industry) = body.industry {
        user.industry = industry;
    }
    if let Some(business_hours) = body.business_hours {
        user.business_hours = business_hours;
    }
    if let Some(team_size) = body.team_size {
        user.team_size = team_size;
    }
    state.repos.users.update(&user).await?;
    Ok(Json(json!({ "user": user })).into_response())
}

async fn get_onboarding(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let user = auth_user(&state, &headers).await?;
    Ok(Json(json!({ "complete": user.onboarding_complete })).into_response())
}

fn onboarding_automations(user_id: &str) -> Vec<Automation> {
    let seeds = [
        (
            "Auto-respond to new inquiries",
            "New WhatsApp message",
            "AI Auto-response",
            "MessageSquare",
            "#25D366",
        ),
        (
            "Follow-up after 24h silence",
            "No response in 24h",
            "Send Follow-up",
            "Clock",
            "#f59e0b",
        ),
        (
            "Hot lead alert",
            "Lead score > 80",
            "Notify Admin",
            "Flame",
            "#ef4444",
        ),
    ];
    seeds
        .iter()
        .map(|(name, trigger, action, icon, color)| Automation {
            id: new_id(),
            user_id: user_id.to_string(),
            name: name.to_string(),
            description: String::new(),
            trigger: trigger.to_string(),
            action: action.to_string(),
            icon: icon.to_string(),
            color: color.to_string(),
            active: true,
            runs: 0,
            success_rate: 0,
            created_at: now_iso(),
        })
        .collect()
}

async fn complete_onboarding(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<OnboardingBody>,
) -> Result<Response, ApiError> {
    let mut user = auth_user(&state, &headers).await?;

    user.business_name = body.business_name;
    user.industry = body.industry;
    user.team_size = body.team_size;
    state.repos.users.update(&user).await?;

    // Each integration connects independently; one failure must not block the
    // rest of onboarding.
    let credentials: [(&str, Option<(&OnboardingCredential, Value)>); 4] = [
        (
            "whatsapp",
            body.integrations
                .whatsapp
                .as_ref()
                .map(|c| (c, json!({ "phoneNumberId": c.phone_number_id }))),
        ),
        (
            "instagram",
            body.integrations
                .instagram
                .as_ref()
                .map(|c| (c, json!({ "igUserId": c.ig_user_id }))),
        ),
        (
            "gmail",
            body.integrations
                .gmail
                .as_ref()
                .map(|c| (c, json!({ "email": c.email }))),
        ),
        (
            "calendar",
            body.integrations
                .calendar
                .as_ref()
                .map(|c| (c, json!({ "calendarId": c.calendar_id }))),
        ),
    ];
    for (platform, credential) in credentials {
        if let Some((credential, metadata)) = credential {
            if let Err(err) = state
                .repos
                .integrations
                .connect(&user.id, platform, &credential.api_key, "", &metadata)
                .await
            {
                warn!(error = %err, platform, "onboarding integration connect failed");
            }
        }
    }

    let forms_status = if body.integrations.website_forms {
        "connected"
    } else {
        "disconnected"
    };
    if let Err(err) = state
        .repos
        .integrations
        .upsert_status(&user.id, "website_forms", forms_status)
        .await
    {
        warn!(error = %err, "onboarding website_forms setup failed");
    }

    if state.repos.automations.count(&user.id).await? == 0 {
        state
            .repos
            .automations
            .create_many(&onboarding_automations(&user.id))
            .await?;
    }

    user.onboarding_complete = true;
    state.repos.users.update(&user).await?;
    Ok(Json(json!({ "success": true, "user": user })).into_response())
}

// ---- leads ----

async fn get_leads(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<LeadsQuery>,
) -> Result<Response, ApiError> {
    let user = auth_user(&state, &headers).await?;
    let status = query.status.trim();
    let status = (!status.is_empty() && status != "all").then_some(status);
    let leads = state.repos.leads.list(&user.id, status).await?;
    Ok(Json(json!({ "leads": leads })).into_response())
}

async fn create_lead(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateLeadBody>,
) -> Result<Response, ApiError> {
    let user = auth_user(&state, &headers).await?;
    if body.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name is required".to_string()));
    }
    let source = body.source.unwrap_or_else(|| "manual".to_string());
    let lead = Lead {
        id: new_id(),
        user_id: user.id.clone(),
        name: body.name.trim().to_string(),
        email: body.email.unwrap_or_default(),
        phone: body.phone.unwrap_or_default(),
        source: source.clone(),
        status: body.status.unwrap_or_else(|| "new".to_string()),
        score: 50,
        sentiment: Sentiment::Neutral,
        tags: body.tags,
        created_at: now_iso(),
        updated_at: now_iso(),
    };
    state.repos.leads.create(&lead).await?;
    log_activity(
        &state,
        &user.id,
        NewActivity {
            title: "New lead added".to_string(),
            description: format!("{} added via {}", lead.name, source),
            channel: source,
            ..Default::default()
        },
    )
    .await;
    Ok((StatusCode::CREATED, Json(json!({ "lead": lead }))).into_response())
}

async fn patch_lead_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(lead_id): Path<String>,
    Json(body): Json<LeadStatusBody>,
) -> Result<Response, ApiError> {
    let user = auth_user(&state, &headers).await?;
    let lead = state
        .repos
        .leads
        .update_status(&user.id, &lead_id, &body.status)
        .await?
        .ok_or(ApiError::NotFound("lead not found"))?;
    log_activity(
        &state,
        &user.id,
        NewActivity {
            title: "Lead status changed".to_string(),
            description: format!("{} moved to {}", lead.name, body.status),
            ..Default::default()
        },
    )
    .await;
    Ok(Json(json!({ "lead": lead })).into_response())
}

async fn delete_lead(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(lead_id): Path<String>,
) -> Result<Response, ApiError> {
    let user = auth_user(&state, &headers).await?;
    if !state.repos.leads.delete(&user.id, &lead_id).await? {
        return Err(ApiError::NotFound("lead not found"));
    }
    Ok(Json(json!({ "success": true })).into_response())
}

// ---- conversations ----

async fn get_conversations(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let user = auth_user(&state, &headers).await?;
    let conversations = state.repos.conversations.list_views(&user.id).await?;
    Ok(Json(json!({ "conversations": conversations })).into_response())
}

async fn create_conversation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateConversationBody>,
) -> Result<Response, ApiError> {
    let user = auth_user(&state, &headers).await?;
    state
        .repos
        .leads
        .find(&user.id, &body.lead_id)
        .await?
        .ok_or(ApiError::NotFound("lead not found"))?;
    let conversation = Conversation {
        id: new_id(),
        user_id: user.id.clone(),
        lead_id: body.lead_id,
        channel: body.channel.unwrap_or_else(|| "web".to_string()),
        sentiment: Sentiment::Neutral,
        score: 50,
        unread_count: 0,
        created_at: now_iso(),
        updated_at: now_iso(),
    };
    state.repos.conversations.create(&conversation).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "conversation": conversation })),
    )
        .into_response())
}

async fn get_messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(conversation_id): Path<String>,
) -> Result<Response, ApiError> {
    let user = auth_user(&state, &headers).await?;
    state
        .repos
        .conversations
        .find(&user.id, &conversation_id)
        .await?
        .ok_or(ApiError::NotFound("conversation not found"))?;
    let messages = state.repos.messages.list(&conversation_id).await?;
    Ok(Json(json!({ "messages": messages })).into_response())
}

async fn send_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(conversation_id): Path<String>,
    Json(body): Json<SendMessageBody>,
) -> Result<Response, ApiError> {
    let user = auth_user(&state, &headers).await?;
    if body.text.trim().is_empty() {
        return Err(ApiError::BadRequest("text is required".to_string()));
    }
    state
        .repos
        .conversations
        .find(&user.id, &conversation_id)
        .await?
        .ok_or(ApiError::NotFound("conversation not found"))?;
    let sender = match body.sender.as_deref() {
        Some("ai") => Sender::Ai,
        Some("customer") => Sender::Customer,
        _ => Sender::Agent,
    };
    let message = state
        .repos
        .messages
        .append(NewMessage {
            conversation_id: conversation_id.clone(),
            sender,
            text: body.text.trim().to_string(),
            sentiment: None,
        })
        .await?;
    state.repos.conversations.touch(&conversation_id).await?;
    Ok((StatusCode::CREATED, Json(json!({ "message": message }))).into_response())
}

async fn inbound_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(conversation_id): Path<String>,
    Json(body): Json<InboundMessageBody>,
) -> Result<Response, ApiError> {
    let user = auth_user(&state, &headers).await?;
    if body.text.trim().is_empty() {
        return Err(ApiError::BadRequest("text is required".to_string()));
    }
    let outcome = pipeline(&state)
        .handle_inbound_message(&user, &conversation_id, body.text.trim())
        .await?;
    Ok(Json(json!({
        "customerMessage": outcome.customer_message,
        "reply": outcome.reply,
        "analysis": outcome.analysis,
    }))
    .into_response())
}

async fn conversation_summary(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(conversation_id): Path<String>,
) -> Result<Response, ApiError> {
    let user = auth_user(&state, &headers).await?;
    state
        .repos
        .conversations
        .find(&user.id, &conversation_id)
        .await?
        .ok_or(ApiError::NotFound("conversation not found"))?;
    let messages = state.repos.messages.list(&conversation_id).await?;
    let summary = match state.assistant.summarize_conversation(&messages).await {
        Ok(summary) => summary,
        Err(err) => {
            warn!(error = %err, conversation_id, "conversation summary failed");
            "Unable to generate summary at this time.".to_string()
        }
    };
    Ok(Json(json!({ "summary": summary })).into_response())
}

// ---- outreach ----

async fn post_outreach(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<OutreachBody>,
) -> Result<Response, ApiError> {
    let user = auth_user(&state, &headers).await?;
    let draft = pipeline(&state)
        .generate_outreach(&user, &body.lead_id, &body.channel, &body.tone)
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": draft.message,
        "lead": draft.lead,
    }))
    .into_response())
}

async fn send_outreach_email(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<OutreachEmailBody>,
) -> Result<Response, ApiError> {
    let user = auth_user(&state, &headers).await?;
    let gmail = state
        .repos
        .integrations
        .find_by_platform(&user.id, "gmail")
        .await?
        .filter(|i| i.status == "connected" && !i.api_key.is_empty());
    let Some(gmail) = gmail else {
        return Ok(Json(json!({
            "success": false,
            "message": "Gmail is not connected. Connect it under integrations first.",
        }))
        .into_response());
    };

    let sender_email = gmail
        .metadata
        .get("email")
        .and_then(Value::as_str)
        .filter(|v| !v.is_empty())
        .unwrap_or(&user.email);
    let raw_message = [
        format!("From: {sender_email}"),
        format!("To: {}", body.to),
        format!("Subject: {}", body.subject),
        "Content-Type: text/plain; charset=utf-8".to_string(),
        String::new(),
        body.body.clone(),
    ]
    .join("\r\n");
    let encoded = URL_SAFE_NO_PAD.encode(raw_message.as_bytes());

    let response = state
        .http
        .post("https://gmail.googleapis.com/gmail/v1/users/me/messages/send")
        .bearer_auth(&gmail.api_key)
        .json(&json!({ "raw": encoded }))
        .send()
        .await;
    let response = match response {
        Ok(response) => response,
        Err(err) => {
            return Ok(Json(json!({
                "success": false,
                "message": format!("Failed to send: {err}"),
            }))
            .into_response());
        }
    };

    if response.status() == StatusCode::UNAUTHORIZED {
        // Expired token; flag the integration so the dashboard prompts a
        // reconnect.
        state
            .repos
            .integrations
            .set_status(&user.id, &gmail.id, "error")
            .await?;
        return Ok(Json(json!({
            "success": false,
            "message": "Gmail token expired. Please reconnect the integration.",
        }))
        .into_response());
    }
    if !response.status().is_success() {
        let status = response.status();
        return Ok(Json(json!({
            "success": false,
            "message": format!("Gmail API error: {status}"),
        }))
        .into_response());
    }

    log_activity(
        &state,
        &user.id,
        NewActivity {
            title: "Email sent".to_string(),
            description: format!("Outreach email sent to {}", body.to),
            channel: "email".to_string(),
            ..Default::default()
        },
    )
    .await;
    Ok(Json(json!({
        "success": true,
        "message": format!("Email sent to {}", body.to),
    }))
    .into_response())
}

// ---- campaigns ----

async fn trigger_campaign_webhook(
    state: &AppState,
    user: &User,
    platform: &str,
    payload: Value,
    activity_title: &str,
    activity_description: String,
) -> Result<Response, ApiError> {
    let integration = state
        .repos
        .integrations
        .find_by_platform(&user.id, platform)
        .await?
        .filter(|i| i.status == "connected" && !i.webhook_url.is_empty());
    let Some(integration) = integration else {
        return Ok(Json(json!({
            "success": false,
            "message": "Make.com webhook is not configured or missing a URL.",
        }))
        .into_response());
    };

    let result = state
        .http
        .post(&integration.webhook_url)
        .json(&payload)
        .send()
        .await;
    match result {
        Ok(response) if response.status().is_success() => {
            log_activity(
                state,
                &user.id,
                NewActivity {
                    title: activity_title.to_string(),
                    description: activity_description,
                    channel: platform.to_string(),
                    ..Default::default()
                },
            )
            .await;
            Ok(Json(json!({
                "success": true,
                "message": "Webhook triggered successfully.",
            }))
            .into_response())
        }
        Ok(response) => Ok(Json(json!({
            "success": false,
            "message": format!("Make webhook returned status {}", response.status()),
        }))
        .into_response()),
        Err(err) => Ok(Json(json!({
            "success": false,
            "message": format!("Failed to trigger webhook: {err}"),
        }))
        .into_response()),
    }
}

async fn trigger_spreadsheet_campaign(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<SpreadsheetCampaignBody>,
) -> Result<Response, ApiError> {
    let user = auth_user(&state, &headers).await?;
    if body.spreadsheet_url.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "spreadsheetUrl is required".to_string(),
        ));
    }
    let payload = json!({
        "action": "trigger_spreadsheet_campaign",
        "timestamp": now_iso(),
        "spreadsheetUrl": body.spreadsheet_url,
        "user": { "email": user.email, "name": user.full_name() },
    });
    trigger_campaign_webhook(
        &state,
        &user,
        "make_webhook",
        payload,
        "Spreadsheet campaign triggered",
        "Sent spreadsheet link to Make.com webhook".to_string(),
    )
    .await
}

async fn trigger_scraper_campaign(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ScraperCampaignBody>,
) -> Result<Response, ApiError> {
    let user = auth_user(&state, &headers).await?;
    if body.niche.trim().is_empty() || body.city.trim().is_empty() || body.service.trim().is_empty()
    {
        return Err(ApiError::BadRequest(
            "niche, city and service are required".to_string(),
        ));
    }
    let payload = json!({
        "action": "trigger_local_scraper",
        "timestamp": now_iso(),
        "niche": body.niche.trim(),
        "city": body.city.trim(),
        "service": body.service.trim(),
        "user": { "email": user.email, "name": user.full_name() },
    });
    trigger_campaign_webhook(
        &state,
        &user,
        "make_scraper_webhook",
        payload,
        "Local scraper triggered",
        format!("Scraping {} in {}", body.niche.trim(), body.city.trim()),
    )
    .await
}

// ---- appointments ----

fn week_window(week_start: &str) -> Result<(String, String), ApiError> {
    let start_date = if week_start.trim().is_empty() {
        Utc::now().date_naive()
    } else {
        NaiveDate::parse_from_str(week_start.trim(), "%Y-%m-%d")
            .map_err(|_| ApiError::BadRequest("weekStart must be YYYY-MM-DD".to_string()))?
    };
    let end_date = start_date + Duration::days(7);
    Ok((
        format!("{start_date}T00:00:00+00:00"),
        format!("{end_date}T00:00:00+00:00"),
    ))
}

/// Current calendar week, Sunday through the following Sunday.
fn current_week_window() -> (String, String) {
    let today = Utc::now().date_naive();
    let start_date = today - Duration::days(today.weekday().num_days_from_sunday() as i64);
    let end_date = start_date + Duration::days(7);
    (
        format!("{start_date}T00:00:00+00:00"),
        format!("{end_date}T00:00:00+00:00"),
    )
}

async fn get_appointments(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<AppointmentsQuery>,
) -> Result<Response, ApiError> {
    let user = auth_user(&state, &headers).await?;
    let (start, end) = week_window(&query.week_start)?;
    let appointments = state
        .repos
        .appointments
        .list_between(&user.id, &start, &end)
        .await?;
    Ok(Json(json!({ "appointments": appointments })).into_response())
}

async fn get_upcoming_appointments(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let user = auth_user(&state, &headers).await?;
    let appointments = state
        .repos
        .appointments
        .upcoming(&user.id, &now_iso(), 5)
        .await?;
    Ok(Json(json!({ "appointments": appointments })).into_response())
}

async fn create_appointment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateAppointmentBody>,
) -> Result<Response, ApiError> {
    let user = auth_user(&state, &headers).await?;
    if body.title.trim().is_empty() {
        return Err(ApiError::BadRequest("title is required".to_string()));
    }
    if let Some(lead_id) = &body.lead_id {
        state
            .repos
            .leads
            .find(&user.id, lead_id)
            .await?
            .ok_or(ApiError::NotFound("lead not found"))?;
    }
    let appointment = Appointment {
        id: new_id(),
        user_id: user.id.clone(),
        lead_id: body.lead_id,
        title: body.title.trim().to_string(),
        appointment_type: body.appointment_type.unwrap_or_else(|| "demo".to_string()),
        start_time: body.start_time,
        end_time: body.end_time,
        duration: body.duration.unwrap_or_else(|| "30 min".to_string()),
        meeting_link: body.meeting_link.unwrap_or_default(),
        notes: body.notes.unwrap_or_default(),
        created_at: now_iso(),
    };
    state.repos.appointments.create(&appointment).await?;
    log_activity(
        &state,
        &user.id,
        NewActivity {
            title: "Meeting Booked".to_string(),
            description: appointment.title.clone(),
            ..Default::default()
        },
    )
    .await;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "appointment": appointment })),
    )
        .into_response())
}

async fn delete_appointment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(appointment_id): Path<String>,
) -> Result<Response, ApiError> {
    let user = auth_user(&state, &headers).await?;
    if !state
        .repos
        .appointments
        .delete(&user.id, &appointment_id)
        .await?
    {
        return Err(ApiError::NotFound("appointment not found"));
    }
    Ok(Json(json!({ "success": true })).into_response())
}

async fn appointment_stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let user = auth_user(&state, &headers).await?;
    let (start, end) = current_week_window();
    let total_meetings = state
        .repos
        .appointments
        .count_between(&user.id, &start, &end)
        .await?;
    Ok(Json(json!({
        "totalMeetings": total_meetings,
        "avgDuration": "28 min",
        "noShows": 0,
    }))
    .into_response())
}

// ---- automations ----

fn default_automations(user_id: &str) -> Vec<Automation> {
    let seeds = [
        (
            "Auto-respond to new WhatsApp leads",
            "Send a personalized AI response within 3 seconds of receiving a new WhatsApp message.",
            "New WhatsApp message",
            "AI Auto-response",
            "MessageSquare",
            "#25D366",
        ),
        (
            "Follow up after 24 hours",
            "Automatically send a follow-up message if the lead hasn't responded within 24 hours.",
            "No response in 24h",
            "Send Follow-up",
            "Clock",
            "#f59e0b",
        ),
        (
            "Book demo with qualified leads",
            "When a lead scores above 80, automatically send a calendar booking link.",
            "Lead score > 80",
            "Send Booking Link",
            "Calendar",
            "#8b5cf6",
        ),
        (
            "Email nurture for cold leads",
            "Send a weekly email digest with case studies and offers to leads scoring below 50.",
            "Lead score < 50",
            "Email Sequence",
            "Mail",
            "#EA4335",
        ),
        (
            "Negative sentiment alert",
            "Immediately notify the team lead when negative sentiment is detected in a conversation.",
            "Sentiment = Negative",
            "Send Alert",
            "Zap",
            "#ef4444",
        ),
    ];
    seeds
        .iter()
        .map(|(name, description, trigger, action, icon, color)| Automation {
            id: new_id(),
            user_id: user_id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            trigger: trigger.to_string(),
            action: action.to_string(),
            icon: icon.to_string(),
            color: color.to_string(),
            active: true,
            runs: 0,
            success_rate: 0,
            created_at: now_iso(),
        })
        .collect()
}

async fn get_automations(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let user = auth_user(&state, &headers).await?;
    let automations = state.repos.automations.list(&user.id).await?;
    Ok(Json(json!({ "automations": automations })).into_response())
}

async fn create_automation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateAutomationBody>,
) -> Result<Response, ApiError> {
    let user = auth_user(&state, &headers).await?;
    let automation = Automation {
        id: new_id(),
        user_id: user.id.clone(),
        name: body.name,
        description: body.description.unwrap_or_default(),
        trigger: body.trigger,
        action: body.action,
        icon: body.icon.unwrap_or_else(|| "Zap".to_string()),
        color: body.color.unwrap_or_else(|| "#3b82f6".to_string()),
        active: body.active.unwrap_or(true),
        runs: 0,
        success_rate: 0,
        created_at: now_iso(),
    };
    state.repos.automations.create(&automation).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "automation": automation })),
    )
        .into_response())
}

async fn toggle_automation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(automation_id): Path<String>,
) -> Result<Response, ApiError> {
    let user = auth_user(&state, &headers).await?;
    let automation = state
        .repos
        .automations
        .find(&user.id, &automation_id)
        .await?
        .ok_or(ApiError::NotFound("automation not found"))?;
    let updated = state
        .repos
        .automations
        .set_active(&user.id, &automation_id, !automation.active)
        .await?
        .ok_or(ApiError::NotFound("automation not found"))?;
    Ok(Json(json!({ "automation": updated })).into_response())
}

async fn delete_automation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(automation_id): Path<String>,
) -> Result<Response, ApiError> {
    let user = auth_user(&state, &headers).await?;
    if !state
        .repos
        .automations
        .delete(&user.id, &automation_id)
        .await?
    {
        return Err(ApiError::NotFound("automation not found"));
    }
    Ok(Json(json!({ "success": true })).into_response())
}

async fn seed_automations(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let user = auth_user(&state, &headers).await?;
    if state.repos.automations.count(&user.id).await? > 0 {
        return Ok(Json(json!({ "seeded": false })).into_response());
    }
    let defaults = default_automations(&user.id);
    state.repos.automations.create_many(&defaults).await?;
    Ok(Json(json!({ "seeded": true, "count": defaults.len() })).into_response())
}

// ---- quick replies ----

fn default_quick_replies(user_id: &str) -> Vec<QuickReply> {
    let seeds = [
        (
            "Welcome Greeting",
            "Hi there! 👋 Thanks for reaching out to us. How can I help you today?",
            "greeting",
        ),
        (
            "Pricing Inquiry",
            "Great question! Our pricing depends on your specific needs. Would you like to schedule a quick call so I can understand your requirements and share the best plan?",
            "pricing",
        ),
        (
            "Meeting Link",
            "I'd love to chat more about this! Here's my calendar link to book a time that works for you: [Insert Calendar Link]",
            "follow-up",
        ),
        (
            "Follow-Up",
            "Hi! Just checking in on our previous conversation. Do you have any questions or would you like to move forward?",
            "follow-up",
        ),
        (
            "Thank You",
            "Thanks so much for choosing us! We're excited to work with you. If you need anything at all, don't hesitate to reach out. 🙌",
            "closing",
        ),
        (
            "Not Available",
            "Thanks for your message! Our team is currently offline but we'll get back to you first thing tomorrow morning. 🕐",
            "general",
        ),
    ];
    seeds
        .iter()
        .map(|(title, reply_body, category)| QuickReply {
            id: new_id(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            body: reply_body.to_string(),
            category: category.to_string(),
            usage_count: 0,
            created_at: now_iso(),
        })
        .collect()
}

async fn get_quick_replies(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let user = auth_user(&state, &headers).await?;
    if state.repos.quick_replies.count(&user.id).await? == 0 {
        state
            .repos
            .quick_replies
            .create_many(&default_quick_replies(&user.id))
            .await?;
    }
    let replies = state.repos.quick_replies.list(&user.id).await?;
    Ok(Json(json!({ "quickReplies": replies })).into_response())
}

async fn create_quick_reply(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateQuickReplyBody>,
) -> Result<Response, ApiError> {
    let user = auth_user(&state, &headers).await?;
    let reply = QuickReply {
        id: new_id(),
        user_id: user.id.clone(),
        title: body.title,
        body: body.body,
        category: body.category.unwrap_or_else(|| "general".to_string()),
        usage_count: 0,
        created_at: now_iso(),
    };
    state.repos.quick_replies.create(&reply).await?;
    Ok((StatusCode::CREATED, Json(json!({ "quickReply": reply }))).into_response())
}

async fn delete_quick_reply(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(reply_id): Path<String>,
) -> Result<Response, ApiError> {
    let user = auth_user(&state, &headers).await?;
    if !state.repos.quick_replies.delete(&user.id, &reply_id).await? {
        return Err(ApiError::NotFound("quick reply not found"));
    }
    Ok(Json(json!({ "success": true })).into_response())
}

async fn use_quick_reply(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(reply_id): Path<String>,
) -> Result<Response, ApiError> {
    let user = auth_user(&state, &headers).await?;
    let reply = state
        .repos
        .quick_replies
        .increment_usage(&user.id, &reply_id)
        .await?
        .ok_or(ApiError::NotFound("quick reply not found"))?;
    Ok(Json(json!({ "quickReply": reply })).into_response())
}

// ---- analytics / dashboard ----

async fn get_analytics(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let user = auth_user(&state, &headers).await?;

    let mut funnel = Vec::new();
    for status in ["new", "contacted", "qualified", "converted"] {
        funnel.push(json!({
            "stage": capitalize(status),
            "value": state.repos.leads.count_by_status(&user.id, status).await?,
        }));
    }

    let mut source_counts = Vec::new();
    let mut total_source_leads = 0i64;
    for source in ["whatsapp", "email", "website", "manual"] {
        let count = state.repos.leads.count_by_source(&user.id, source).await?;
        total_source_leads += count;
        source_counts.push((source, count));
    }
    let denominator = total_source_leads.max(1) as f64;
    let source_data = source_counts
        .iter()
        .map(|(source, count)| {
            json!({
                "name": capitalize(source),
                "value": (*count as f64 / denominator * 100.0).round() as i64,
            })
        })
        .collect::<Vec<_>>();

    let sentiment_counts = json!({
        "positive": state.repos.conversations.count_by_sentiment(&user.id, Sentiment::Positive).await?,
        "neutral": state.repos.conversations.count_by_sentiment(&user.id, Sentiment::Neutral).await?,
        "negative": state.repos.conversations.count_by_sentiment(&user.id, Sentiment::Negative).await?,
    });

    let total_leads = state.repos.leads.count(&user.id).await?;
    let converted = state
        .repos
        .leads
        .count_by_status(&user.id, "converted")
        .await?;
    let conversion_rate = if total_leads > 0 {
        format!("{:.1}%", converted as f64 / total_leads as f64 * 100.0)
    } else {
        "0%".to_string()
    };

    let automations = state.repos.automations.list(&user.id).await?;
    let total_runs = automations.iter().map(|a| a.runs as i64).sum::<i64>();
    let avg_success_rate = if automations.is_empty() {
        0
    } else {
        (automations.iter().map(|a| a.success_rate as f64).sum::<f64>()
            / automations.len() as f64)
            .round() as i64
    };

    Ok(Json(json!({
        "stats": {
            "totalLeads": total_leads,
            "conversionRate": conversion_rate,
            "avgResponseTime": "3.2s",
            "revenueImpact": format!("₹{}", converted * 4830),
        },
        "funnelData": funnel,
        "sourceData": source_data,
        "sentimentCounts": sentiment_counts,
        "automationStats": {
            "totalRuns": total_runs,
            "avgSuccessRate": avg_success_rate,
        },
    }))
    .into_response())
}

async fn get_dashboard(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let user = auth_user(&state, &headers).await?;
    let total_leads = state.repos.leads.count(&user.id).await?;
    let conversations = state.repos.conversations.count(&user.id).await?;
    let meetings_booked = state
        .repos
        .activities
        .count_by_title(&user.id, "Meeting Booked")
        .await?;
    let feed = state.repos.activities.recent(&user.id, 5).await?;
    Ok(Json(json!({
        "metrics": {
            "totalLeads": total_leads,
            "conversations": conversations,
            "meetingsBooked": meetings_booked,
            "responseRate": "98.2%",
            "avgResponseTime": "1m 42s",
        },
        "feed": feed,
        "user": user,
    }))
    .into_response())
}

async fn get_dashboard_brief(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let user = auth_user(&state, &headers).await?;
    let stats = pipeline(&state).pipeline_stats(&user.id).await?;
    let brief = match state.assistant.lead_health_brief(stats).await {
        Ok(brief) => brief,
        Err(err) => {
            warn!(error = %err, "lead health brief failed, using templated fallback");
            format!(
                "You have {} total leads with {} hot prospects. Focus on your {} at-risk conversations today.",
                stats.total_leads, stats.hot_leads, stats.negative_conversations
            )
        }
    };
    Ok(Json(json!({ "brief": brief })).into_response())
}

// ---- integrations ----

async fn get_integrations(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let user = auth_user(&state, &headers).await?;
    // New platforms added since the tenant's last visit get seeded with fresh
    // secrets; existing rows are left alone. One shared timestamp so the
    // platform tiebreak keeps the list order stable.
    let seeded_at = now_iso();
    let missing = PLATFORMS
        .iter()
        .map(|platform| Integration {
            id: new_id(),
            user_id: user.id.clone(),
            platform: platform.to_string(),
            status: "disconnected".to_string(),
            api_key: String::new(),
            webhook_url: String::new(),
            webhook_secret: new_webhook_secret(),
            metadata: Value::Object(Default::default()),
            connected_at: None,
            created_at: seeded_at.clone(),
        })
        .collect::<Vec<_>>();
    state.repos.integrations.create_many(&missing).await?;
    let integrations = state.repos.integrations.list(&user.id).await?;
    Ok(Json(json!({ "integrations": integrations })).into_response())
}

async fn connect_integration(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(platform): Path<String>,
    Json(body): Json<ConnectIntegrationBody>,
) -> Result<Response, ApiError> {
    let user = auth_user(&state, &headers).await?;
    if !PLATFORMS.contains(&platform.as_str()) {
        return Err(ApiError::BadRequest(format!(
            "unknown platform: {platform}"
        )));
    }
    let metadata = body.metadata.unwrap_or_else(|| json!({}));
    let integration = state
        .repos
        .integrations
        .connect(
            &user.id,
            &platform,
            body.api_key.as_deref().unwrap_or(""),
            body.webhook_url.as_deref().unwrap_or(""),
            &metadata,
        )
        .await?;
    log_activity(
        &state,
        &user.id,
        NewActivity {
            title: "Integration connected".to_string(),
            description: format!("{platform} integration activated"),
            channel: platform,
            ..Default::default()
        },
    )
    .await;
    Ok(Json(json!({ "integration": integration })).into_response())
}

async fn disconnect_integration(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(integration_id): Path<String>,
) -> Result<Response, ApiError> {
    let user = auth_user(&state, &headers).await?;
    let integration = state
        .repos
        .integrations
        .disconnect(&user.id, &integration_id)
        .await?
        .ok_or(ApiError::NotFound("integration not found"))?;
    log_activity(
        &state,
        &user.id,
        NewActivity {
            title: "Integration disconnected".to_string(),
            description: format!("{} integration deactivated", integration.platform),
            channel: integration.platform.clone(),
            ..Default::default()
        },
    )
    .await;
    Ok(Json(json!({ "integration": integration })).into_response())
}

async fn test_integration(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(integration_id): Path<String>,
) -> Result<Response, ApiError> {
    let user = auth_user(&state, &headers).await?;
    let integration = state
        .repos
        .integrations
        .find(&user.id, &integration_id)
        .await?
        .ok_or(ApiError::NotFound("integration not found"))?;
    if integration.status != "connected" {
        return Ok(Json(json!({
            "success": false,
            "message": "Integration is not connected",
        }))
        .into_response());
    }
    let (success, message) = ping_integration(&state, &integration).await;
    Ok(Json(json!({ "success": success, "message": message })).into_response())
}

/// Live connectivity check against the real upstream for each platform.
async fn ping_integration(state: &AppState, integration: &Integration) -> (bool, String) {
    match integration.platform.as_str() {
        "gmail" => {
            if integration.api_key.is_empty() {
                return (false, "No OAuth token provided".to_string());
            }
            let result = state
                .http
                .get("https://gmail.googleapis.com/gmail/v1/users/me/profile")
                .bearer_auth(&integration.api_key)
                .send()
                .await;
            match result {
                Ok(response) if response.status().is_success() => {
                    let profile: Value = response.json().await.unwrap_or_default();
                    let address = profile
                        .get("emailAddress")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown");
                    (true, format!("Gmail connected: {address}"))
                }
                Ok(response) => (false, format!("Gmail API error: {}", response.status())),
                Err(err) => (false, format!("Gmail test failed: {err}")),
            }
        }
        "calendar" => {
            if integration.api_key.is_empty() {
                return (false, "No OAuth token provided".to_string());
            }
            let calendar_id = integration
                .metadata
                .get("calendarId")
                .and_then(Value::as_str)
                .filter(|v| !v.is_empty())
                .unwrap_or("primary");
            let url = format!(
                "https://www.googleapis.com/calendar/v3/calendars/{calendar_id}/events"
            );
            let result = state
                .http
                .get(&url)
                .query(&[
                    ("maxResults", "3"),
                    ("timeMin", &now_iso()),
                    ("singleEvents", "true"),
                    ("orderBy", "startTime"),
                ])
                .bearer_auth(&integration.api_key)
                .send()
                .await;
            match result {
                Ok(response) if response.status().is_success() => {
                    let data: Value = response.json().await.unwrap_or_default();
                    let events = data
                        .get("items")
                        .and_then(Value::as_array)
                        .map(Vec::len)
                        .unwrap_or(0);
                    (
                        true,
                        format!("Calendar connected: {events} upcoming events"),
                    )
                }
                Ok(response) => (false, format!("Calendar API error: {}", response.status())),
                Err(err) => (false, format!("Calendar test failed: {err}")),
            }
        }
        "whatsapp" => {
            if integration.api_key.is_empty() {
                return (false, "No API key provided".to_string());
            }
            let Some(phone_id) = integration
                .metadata
                .get("phoneNumberId")
                .and_then(Value::as_str)
                .filter(|v| !v.is_empty())
            else {
                return (false, "No Phone Number ID configured".to_string());
            };
            let url = format!("https://graph.facebook.com/v18.0/{phone_id}");
            let result = state
                .http
                .get(&url)
                .bearer_auth(&integration.api_key)
                .send()
                .await;
            match result {
                Ok(response) if response.status().is_success() => {
                    let data: Value = response.json().await.unwrap_or_default();
                    let number = data
                        .get("display_phone_number")
                        .and_then(Value::as_str)
                        .unwrap_or("phone verified");
                    (true, format!("WhatsApp connected: {number}"))
                }
                Ok(response) => (false, format!("WhatsApp API error: {}", response.status())),
                Err(err) => (false, format!("WhatsApp test failed: {err}")),
            }
        }
        "instagram" => {
            if integration.api_key.is_empty() {
                return (false, "No access token provided".to_string());
            }
            let result = state
                .http
                .get("https://graph.facebook.com/v18.0/me")
                .query(&[
                    ("fields", "id,name,username"),
                    ("access_token", integration.api_key.as_str()),
                ])
                .send()
                .await;
            match result {
                Ok(response) if response.status().is_success() => {
                    let data: Value = response.json().await.unwrap_or_default();
                    let handle = data
                        .get("username")
                        .or_else(|| data.get("name"))
                        .and_then(Value::as_str)
                        .unwrap_or("account");
                    (true, format!("Instagram connected: @{handle}"))
                }
                Ok(response) => (
                    false,
                    format!("Instagram API error: {}", response.status()),
                ),
                Err(err) => (false, format!("Instagram test failed: {err}")),
            }
        }
        "website_forms" => (
            true,
            format!(
                "Webhook active: POST to {}/webhooks/ingest?platform=website_forms",
                state.public_base_url
            ),
        ),
        "make_webhook" | "make_scraper_webhook" => {
            if integration.webhook_url.is_empty() {
                return (false, "No Webhook URL provided".to_string());
            }
            let result = state
                .http
                .post(&integration.webhook_url)
                .json(&json!({ "ping": true, "source": "FlowAI Test" }))
                .send()
                .await;
            match result {
                Ok(response) if response.status().is_success() => {
                    (true, "Make.com webhook is reachable".to_string())
                }
                Ok(response) => (
                    false,
                    format!("Webhook responded with status {}", response.status()),
                ),
                Err(err) => (false, format!("Webhook test failed: {err}")),
            }
        }
        other => (false, format!("Unknown platform: {other}")),
    }
}

// ---- webhook ingest ----

async fn ingest_readiness() -> impl IntoResponse {
    Json(json!({
        "status": "active",
        "message": "Webhook ingest endpoint is ready. Send a POST request with lead data.",
        "requiredFields": ["secret", "name"],
        "optionalFields": ["email", "phone", "message", "metadata"],
    }))
}

async fn ingest_lead(
    State(state): State<Arc<AppState>>,
    Query(query): Query<IngestQuery>,
    Json(body): Json<IngestBody>,
) -> Result<Response, ApiError> {
    let platform = query
        .platform
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| "website_forms".to_string());
    if body.secret.trim().is_empty() || body.name.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "Missing required fields: secret, name".to_string(),
        ));
    }
    let integration = state
        .repos
        .integrations
        .find_connected_by_secret(body.secret.trim(), &platform)
        .await?
        .ok_or(ApiError::Unauthorized(
            "invalid webhook secret or integration not connected",
        ))?;

    let source = if platform == "website_forms" {
        "website".to_string()
    } else {
        platform.clone()
    };
    let lead = Lead {
        id: new_id(),
        user_id: integration.user_id.clone(),
        name: body.name.trim().to_string(),
        email: body.email.unwrap_or_default(),
        phone: body.phone.unwrap_or_default(),
        source,
        status: "new".to_string(),
        score: 50,
        sentiment: Sentiment::Neutral,
        tags: vec![],
        created_at: now_iso(),
        updated_at: now_iso(),
    };
    state.repos.leads.create(&lead).await?;

    if let Some(message) = body.message.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
        let channel = if platform == "website_forms" {
            "web".to_string()
        } else {
            platform.clone()
        };
        let conversation = Conversation {
            id: new_id(),
            user_id: integration.user_id.clone(),
            lead_id: lead.id.clone(),
            channel,
            sentiment: Sentiment::Neutral,
            score: 50,
            unread_count: 0,
            created_at: now_iso(),
            updated_at: now_iso(),
        };
        state.repos.conversations.create(&conversation).await?;
        state
            .repos
            .messages
            .append(NewMessage {
                conversation_id: conversation.id,
                sender: Sender::Customer,
                text: message.to_string(),
                sentiment: None,
            })
            .await?;
    }

    log_activity(
        &state,
        &integration.user_id,
        NewActivity {
            title: "New lead from webhook".to_string(),
            description: format!("{} captured via {}", lead.name, platform),
            channel: platform.clone(),
            ..Default::default()
        },
    )
    .await;

    Ok(Json(json!({
        "success": true,
        "leadId": lead.id,
        "message": format!("Lead \"{}\" created successfully via {}", lead.name, platform),
    }))
    .into_response())
}

// ---- router / startup ----

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/account",
            get(get_account).post(create_account).patch(patch_account),
        )
        .route(
            "/api/account/onboarding",
            get(get_onboarding).post(complete_onboarding),
        )
        .route("/api/leads", get(get_leads).post(create_lead))
        .route("/api/leads/{lead_id}", delete(delete_lead))
        .route("/api/leads/{lead_id}/status", patch(patch_lead_status))
        .route(
            "/api/conversations",
            get(get_conversations).post(create_conversation),
        )
        .route(
            "/api/conversations/{conversation_id}/messages",
            get(get_messages).post(send_message),
        )
        .route(
            "/api/conversations/{conversation_id}/inbound",
            post(inbound_message),
        )
        .route(
            "/api/conversations/{conversation_id}/summary",
            get(conversation_summary),
        )
        .route("/api/outreach", post(post_outreach))
        .route("/api/outreach/email", post(send_outreach_email))
        .route(
            "/api/campaigns/spreadsheet",
            post(trigger_spreadsheet_campaign),
        )
        .route("/api/campaigns/scraper", post(trigger_scraper_campaign))
        .route(
            "/api/appointments",
            get(get_appointments).post(create_appointment),
        )
        .route("/api/appointments/upcoming", get(get_upcoming_appointments))
        .route("/api/appointments/stats", get(appointment_stats))
        .route(
            "/api/appointments/{appointment_id}",
            delete(delete_appointment),
        )
        .route(
            "/api/automations",
            get(get_automations).post(create_automation),
        )
        .route("/api/automations/seed", post(seed_automations))
        .route(
            "/api/automations/{automation_id}",
            delete(delete_automation),
        )
        .route(
            "/api/automations/{automation_id}/toggle",
            post(toggle_automation),
        )
        .route(
            "/api/quick-replies",
            get(get_quick_replies).post(create_quick_reply),
        )
        .route(
            "/api/quick-replies/{reply_id}",
            delete(delete_quick_reply),
        )
        .route("/api/quick-replies/{reply_id}/use", post(use_quick_reply))
        .route("/api/analytics", get(get_analytics))
        .route("/api/dashboard", get(get_dashboard))
        .route("/api/dashboard/brief", get(get_dashboard_brief))
        .route("/api/integrations", get(get_integrations))
        .route(
            "/api/integrations/{platform}/connect",
            post(connect_integration),
        )
        .route(
            "/api/integrations/{integration_id}/disconnect",
            post(disconnect_integration),
        )
        .route(
            "/api/integrations/{integration_id}/test",
            post(test_integration),
        )
        .route("/webhooks/ingest", get(ingest_readiness).post(ingest_lead))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();

    let db = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&db).await?;

    let state = Arc::new(AppState {
        repos: Repos::postgres(db),
        assistant: Arc::new(GeminiClient::new(&config.gemini)),
        http: reqwest::Client::new(),
        public_base_url: config.public_base_url.clone(),
    });

    let app = build_router(state);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(port = config.port, "flowai server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
