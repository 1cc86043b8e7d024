use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use flowai_server::ai::{AiError, SalesAssistant};
use flowai_server::app::build_router;
use flowai_server::store::memory::MemStore;
use flowai_server::store::{new_id, now_iso, Repos, UserRepo};
use flowai_server::types::{AppState, LeadAnalysis, Sentiment, User};

const API_KEY: &str = "test-api-key";

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
            reply: Some("Our starter plan is $29/month. Want a quick demo?".to_string()),
        }
    }

    fn broken() -> ScriptedAssistant {
        ScriptedAssistant {
            analysis: None,
            reply: None,
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
        _history: &[flowai_server::types::HistoryTurn],
        _new_message: &str,
    ) -> Result<String, AiError> {
        self.reply.clone().ok_or(AiError::EmptyResponse)
    }

    async fn summarize_conversation(
        &self,
        _messages: &[flowai_server::types::ChatMessage],
    ) -> Result<String, AiError> {
        self.reply.clone().ok_or(AiError::EmptyResponse)
    }

    async fn lead_health_brief(
        &self,
        _stats: flowai_server::types::PipelineStats,
    ) -> Result<String, AiError> {
        self.reply.clone().ok_or(AiError::EmptyResponse)
    }
}

fn tenant(api_key: &str, email: &str) -> User {
    User {
        id: new_id(),
        api_key: api_key.to_string(),
        email: email.to_string(),
        first_name: "Ada".to_string(),
        last_name: "Okafor".to_string(),
        business_name: "Acme Dental".to_string(),
        industry: "Healthcare".to_string(),
        business_hours: "8 AM to 4 PM".to_string(),
        team_size: "2-5".to_string(),
        onboarding_complete: true,
        created_at: now_iso(),
    }
}

async fn app_with(assistant: ScriptedAssistant) -> Router {
    let store = Arc::new(MemStore::default());
    UserRepo::create(store.as_ref(), &tenant(API_KEY, "owner@acme.test"))
        .await
        .unwrap();
    let state = Arc::new(AppState {
        repos: Repos::from_mem(store),
        assistant: Arc::new(assistant),
        http: reqwest::Client::new(),
        public_base_url: "http://localhost:4000".to_string(),
    });
    build_router(state)
}

async fn app() -> Router {
    app_with(ScriptedAssistant::working()).await
}

async fn send(
    router: &Router,
    method: &str,
    uri: &str,
    api_key: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(key) = api_key {
        builder = builder.header("x-api-key", key);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn health_is_open() {
    let router = app().await;
    let (status, body) = send(&router, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], json!(true));
}

#[tokio::test]
async fn protected_routes_reject_missing_or_bad_keys() {
    let router = app().await;
    let (status, body) = send(&router, "GET", "/api/leads", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].as_str().unwrap().contains("x-api-key"));

    let (status, _) = send(&router, "GET", "/api/leads", Some("wrong-key"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn account_signup_issues_key_and_rejects_duplicates() {
    let router = app().await;
    let body = json!({ "email": "new@acme.test", "firstName": "Sam", "lastName": "Lee" });
    let (status, created) = send(&router, "POST", "/api/account", None, Some(body.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    let key = created["user"]["apiKey"].as_str().unwrap().to_string();
    assert!(!key.is_empty());

    let (status, me) = send(&router, "GET", "/api/account", Some(&key), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["user"]["email"], json!("new@acme.test"));

    let (status, _) = send(&router, "POST", "/api/account", None, Some(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn lead_lifecycle_logs_activities() {
    let router = app().await;
    let (status, created) = send(
        &router,
        "POST",
        "/api/leads",
        Some(API_KEY),
        Some(json!({ "name": "Jane Doe", "email": "jane@test.dev", "source": "whatsapp" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let lead_id = created["lead"]["id"].as_str().unwrap().to_string();
    assert_eq!(created["lead"]["status"], json!("new"));
    assert_eq!(created["lead"]["score"], json!(50));

    let (status, updated) = send(
        &router,
        "PATCH",
        &format!("/api/leads/{lead_id}/status"),
        Some(API_KEY),
        Some(json!({ "status": "qualified" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["lead"]["status"], json!("qualified"));

    let (_, dashboard) = send(&router, "GET", "/api/dashboard", Some(API_KEY), None).await;
    let titles = dashboard["feed"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["title"].as_str().unwrap().to_string())
        .collect::<Vec<_>>();
    assert!(titles.contains(&"New lead added".to_string()));
    assert!(titles.contains(&"Lead status changed".to_string()));

    let (status, _) = send(
        &router,
        "DELETE",
        &format!("/api/leads/{lead_id}"),
        Some(API_KEY),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, listed) = send(&router, "GET", "/api/leads", Some(API_KEY), None).await;
    assert!(listed["leads"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn lead_status_filter_narrows_the_list() {
    let router = app().await;
    for (name, status) in [("A", "new"), ("B", "qualified"), ("C", "qualified")] {
        send(
            &router,
            "POST",
            "/api/leads",
            Some(API_KEY),
            Some(json!({ "name": name, "status": status })),
        )
        .await;
    }
    let (_, all) = send(&router, "GET", "/api/leads?status=all", Some(API_KEY), None).await;
    assert_eq!(all["leads"].as_array().unwrap().len(), 3);
    let (_, qualified) = send(
        &router,
        "GET",
        "/api/leads?status=qualified",
        Some(API_KEY),
        None,
    )
    .await;
    assert_eq!(qualified["leads"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn tenants_cannot_touch_each_others_leads() {
    let router = app().await;
    let (_, other) = send(
        &router,
        "POST",
        "/api/account",
        None,
        Some(json!({ "email": "rival@other.test", "firstName": "Rae", "lastName": "Kim" })),
    )
    .await;
    let other_key = other["user"]["apiKey"].as_str().unwrap().to_string();

    let (_, created) = send(
        &router,
        "POST",
        "/api/leads",
        Some(API_KEY),
        Some(json!({ "name": "Secret Lead" })),
    )
    .await;
    let lead_id = created["lead"]["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &router,
        "PATCH",
        &format!("/api/leads/{lead_id}/status"),
        Some(&other_key),
        Some(json!({ "status": "converted" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, listed) = send(&router, "GET", "/api/leads", Some(&other_key), None).await;
    assert!(listed["leads"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn inbound_message_runs_the_full_pipeline() {
    let router = app().await;
    let (_, lead) = send(
        &router,
        "POST",
        "/api/leads",
        Some(API_KEY),
        Some(json!({ "name": "Jane Doe" })),
    )
    .await;
    let lead_id = lead["lead"]["id"].as_str().unwrap().to_string();
    let (_, conversation) = send(
        &router,
        "POST",
        "/api/conversations",
        Some(API_KEY),
        Some(json!({ "leadId": lead_id, "channel": "whatsapp" })),
    )
    .await;
    let conversation_id = conversation["conversation"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let (status, outcome) = send(
        &router,
        "POST",
        &format!("/api/conversations/{conversation_id}/inbound"),
        Some(API_KEY),
        Some(json!({ "text": "What are your prices?" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        outcome["reply"]["text"],
        json!("Our starter plan is $29/month. Want a quick demo?")
    );
    assert_eq!(outcome["analysis"]["leadScore"], json!(85));

    let (_, messages) = send(
        &router,
        "GET",
        &format!("/api/conversations/{conversation_id}/messages"),
        Some(API_KEY),
        None,
    )
    .await;
    let messages = messages["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["sender"], json!("customer"));
    assert_eq!(messages[1]["sender"], json!("ai"));

    let (_, threads) = send(&router, "GET", "/api/conversations", Some(API_KEY), None).await;
    let view = &threads["conversations"].as_array().unwrap()[0];
    assert_eq!(view["unreadCount"], json!(1));
    assert_eq!(view["sentiment"], json!("positive"));
    assert_eq!(view["score"], json!(85));
}

#[tokio::test]
async fn broken_model_still_answers_the_customer() {
    let router = app_with(ScriptedAssistant::broken()).await;
    let (_, lead) = send(
        &router,
        "POST",
        "/api/leads",
        Some(API_KEY),
        Some(json!({ "name": "Jane Doe" })),
    )
    .await;
    let lead_id = lead["lead"]["id"].as_str().unwrap().to_string();
    let (_, conversation) = send(
        &router,
        "POST",
        "/api/conversations",
        Some(API_KEY),
        Some(json!({ "leadId": lead_id })),
    )
    .await;
    let conversation_id = conversation["conversation"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let (status, outcome) = send(
        &router,
        "POST",
        &format!("/api/conversations/{conversation_id}/inbound"),
        Some(API_KEY),
        Some(json!({ "text": "hello" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["analysis"]["intent"], json!("Unknown intent"));
    assert_eq!(outcome["analysis"]["leadScore"], json!(50));
    assert_eq!(
        outcome["reply"]["text"],
        json!("Thank you for reaching out. An agent will get back to you shortly.")
    );
}

#[tokio::test]
async fn summary_degrades_to_a_canned_line() {
    let router = app_with(ScriptedAssistant::broken()).await;
    let (_, lead) = send(
        &router,
        "POST",
        "/api/leads",
        Some(API_KEY),
        Some(json!({ "name": "Jane Doe" })),
    )
    .await;
    let lead_id = lead["lead"]["id"].as_str().unwrap().to_string();
    let (_, conversation) = send(
        &router,
        "POST",
        "/api/conversations",
        Some(API_KEY),
        Some(json!({ "leadId": lead_id })),
    )
    .await;
    let conversation_id = conversation["conversation"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let (status, body) = send(
        &router,
        "GET",
        &format!("/api/conversations/{conversation_id}/summary"),
        Some(API_KEY),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["summary"],
        json!("Unable to generate summary at this time.")
    );
}

#[tokio::test]
async fn outreach_returns_a_draft_without_sending() {
    let router = app().await;
    let (_, lead) = send(
        &router,
        "POST",
        "/api/leads",
        Some(API_KEY),
        Some(json!({ "name": "Jane Doe", "email": "jane@test.dev" })),
    )
    .await;
    let lead_id = lead["lead"]["id"].as_str().unwrap().to_string();

    let (status, draft) = send(
        &router,
        "POST",
        "/api/outreach",
        Some(API_KEY),
        Some(json!({ "leadId": lead_id, "channel": "email", "tone": "friendly" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(draft["success"], json!(true));
    assert_eq!(
        draft["message"],
        json!("Our starter plan is $29/month. Want a quick demo?")
    );
    assert_eq!(draft["lead"]["name"], json!("Jane Doe"));
    assert_eq!(draft["lead"]["email"], json!("jane@test.dev"));
}

#[tokio::test]
async fn quick_replies_seed_once_and_rank_by_usage() {
    let router = app().await;
    let (_, first) = send(&router, "GET", "/api/quick-replies", Some(API_KEY), None).await;
    let replies = first["quickReplies"].as_array().unwrap();
    assert_eq!(replies.len(), 6);
    let target = replies
        .iter()
        .find(|r| r["title"] == json!("Follow-Up"))
        .unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    let (_, again) = send(&router, "GET", "/api/quick-replies", Some(API_KEY), None).await;
    assert_eq!(again["quickReplies"].as_array().unwrap().len(), 6);

    send(
        &router,
        "POST",
        &format!("/api/quick-replies/{target}/use"),
        Some(API_KEY),
        None,
    )
    .await;
    let (_, ranked) = send(&router, "GET", "/api/quick-replies", Some(API_KEY), None).await;
    let top = &ranked["quickReplies"].as_array().unwrap()[0];
    assert_eq!(top["title"], json!("Follow-Up"));
    assert_eq!(top["usageCount"], json!(1));
}

#[tokio::test]
async fn automation_seed_is_idempotent() {
    let router = app().await;
    let (status, seeded) = send(&router, "POST", "/api/automations/seed", Some(API_KEY), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(seeded["seeded"], json!(true));
    assert_eq!(seeded["count"], json!(5));

    let (_, again) = send(&router, "POST", "/api/automations/seed", Some(API_KEY), None).await;
    assert_eq!(again["seeded"], json!(false));

    let (_, listed) = send(&router, "GET", "/api/automations", Some(API_KEY), None).await;
    let automations = listed["automations"].as_array().unwrap();
    assert_eq!(automations.len(), 5);

    let id = automations[0]["id"].as_str().unwrap().to_string();
    let was_active = automations[0]["active"].as_bool().unwrap();
    let (_, toggled) = send(
        &router,
        "POST",
        &format!("/api/automations/{id}/toggle"),
        Some(API_KEY),
        None,
    )
    .await;
    assert_eq!(toggled["automation"]["active"], json!(!was_active));
}

#[tokio::test]
async fn appointments_book_and_surface_on_the_dashboard() {
    let router = app().await;
    let start = (chrono::Utc::now() + chrono::Duration::days(1)).to_rfc3339();
    let end = (chrono::Utc::now() + chrono::Duration::days(1) + chrono::Duration::minutes(30))
        .to_rfc3339();
    let (status, booked) = send(
        &router,
        "POST",
        "/api/appointments",
        Some(API_KEY),
        Some(json!({ "title": "Demo with Jane", "startTime": start, "endTime": end })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(booked["appointment"]["type"], json!("demo"));

    let (_, upcoming) = send(
        &router,
        "GET",
        "/api/appointments/upcoming",
        Some(API_KEY),
        None,
    )
    .await;
    assert_eq!(upcoming["appointments"].as_array().unwrap().len(), 1);

    let (_, dashboard) = send(&router, "GET", "/api/dashboard", Some(API_KEY), None).await;
    assert_eq!(dashboard["metrics"]["meetingsBooked"], json!(1));
}

#[tokio::test]
async fn stats_cover_the_whole_calendar_week_not_a_rolling_one() {
    use chrono::Datelike;

    let router = app().await;
    let today = chrono::Utc::now().date_naive();
    let sunday = today - chrono::Duration::days(today.weekday().num_days_from_sunday() as i64);

    // Booked at the start of the current week, possibly before today.
    let (status, _) = send(
        &router,
        "POST",
        "/api/appointments",
        Some(API_KEY),
        Some(json!({
            "title": "Kickoff call",
            "startTime": format!("{sunday}T12:00:00+00:00"),
            "endTime": format!("{sunday}T12:30:00+00:00"),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    // Next week's booking must not count yet.
    let next_week = sunday + chrono::Duration::days(8);
    send(
        &router,
        "POST",
        "/api/appointments",
        Some(API_KEY),
        Some(json!({
            "title": "Future demo",
            "startTime": format!("{next_week}T12:00:00+00:00"),
            "endTime": format!("{next_week}T12:30:00+00:00"),
        })),
    )
    .await;

    let (_, stats) = send(&router, "GET", "/api/appointments/stats", Some(API_KEY), None).await;
    assert_eq!(stats["totalMeetings"], json!(1));
}

#[tokio::test]
async fn integrations_seed_all_platforms_with_secrets() {
    let router = app().await;
    let (status, listed) = send(&router, "GET", "/api/integrations", Some(API_KEY), None).await;
    assert_eq!(status, StatusCode::OK);
    let integrations = listed["integrations"].as_array().unwrap();
    assert_eq!(integrations.len(), 7);
    for integration in integrations {
        assert_eq!(integration["status"], json!("disconnected"));
        assert!(!integration["webhookSecret"].as_str().unwrap().is_empty());
    }

    // Second fetch must not duplicate rows or rotate secrets.
    let first_secret = integrations[0]["webhookSecret"].clone();
    let first_platform = integrations[0]["platform"].clone();
    let (_, again) = send(&router, "GET", "/api/integrations", Some(API_KEY), None).await;
    let again = again["integrations"].as_array().unwrap();
    assert_eq!(again.len(), 7);
    let same = again
        .iter()
        .find(|i| i["platform"] == first_platform)
        .unwrap();
    assert_eq!(same["webhookSecret"], first_secret);
}

#[tokio::test]
async fn integration_list_order_is_stable() {
    let router = app().await;
    let (_, listed) = send(&router, "GET", "/api/integrations", Some(API_KEY), None).await;
    let platforms = listed["integrations"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["platform"].as_str().unwrap().to_string())
        .collect::<Vec<_>>();
    assert_eq!(
        platforms,
        vec![
            "calendar",
            "gmail",
            "instagram",
            "make_scraper_webhook",
            "make_webhook",
            "website_forms",
            "whatsapp",
        ]
    );

    let (_, again) = send(&router, "GET", "/api/integrations", Some(API_KEY), None).await;
    let again_platforms = again["integrations"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["platform"].as_str().unwrap().to_string())
        .collect::<Vec<_>>();
    assert_eq!(platforms, again_platforms);
}

#[tokio::test]
async fn untested_platforms_refuse_when_disconnected() {
    let router = app().await;
    let (_, listed) = send(&router, "GET", "/api/integrations", Some(API_KEY), None).await;
    let id = listed["integrations"].as_array().unwrap()[0]["id"]
        .as_str()
        .unwrap()
        .to_string();
    let (status, result) = send(
        &router,
        "POST",
        &format!("/api/integrations/{id}/test"),
        Some(API_KEY),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["success"], json!(false));
    assert_eq!(result["message"], json!("Integration is not connected"));
}

async fn connect_website_forms(router: &Router) -> String {
    send(
        router,
        "POST",
        "/api/integrations/website_forms/connect",
        Some(API_KEY),
        Some(json!({})),
    )
    .await
    .1["integration"]["webhookSecret"]
        .as_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn webhook_ingest_creates_lead_and_thread() {
    let router = app().await;
    let secret = connect_website_forms(&router).await;

    let (status, result) = send(
        &router,
        "POST",
        "/webhooks/ingest?platform=website_forms",
        None,
        Some(json!({ "secret": secret, "name": "Web Visitor", "message": "Do you ship abroad?" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["success"], json!(true));
    assert!(result["leadId"].as_str().is_some());

    let (_, leads) = send(&router, "GET", "/api/leads", Some(API_KEY), None).await;
    let lead = &leads["leads"].as_array().unwrap()[0];
    assert_eq!(lead["name"], json!("Web Visitor"));
    assert_eq!(lead["source"], json!("website"));
    assert_eq!(lead["conversationCount"], json!(1));

    let (_, threads) = send(&router, "GET", "/api/conversations", Some(API_KEY), None).await;
    let view = &threads["conversations"].as_array().unwrap()[0];
    assert_eq!(view["channel"], json!("web"));
    assert_eq!(view["messages"][0]["text"], json!("Do you ship abroad?"));
}

#[tokio::test]
async fn webhook_ingest_validates_secret_and_fields() {
    let router = app().await;
    connect_website_forms(&router).await;

    let (status, body) = send(
        &router,
        "POST",
        "/webhooks/ingest",
        None,
        Some(json!({ "secret": "not-the-secret", "name": "Mallory" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].as_str().is_some());

    let (status, body) = send(
        &router,
        "POST",
        "/webhooks/ingest",
        None,
        Some(json!({ "secret": "whatever" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"],
        json!("Missing required fields: secret, name")
    );

    let (_, leads) = send(&router, "GET", "/api/leads", Some(API_KEY), None).await;
    assert!(leads["leads"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn analytics_reflects_the_funnel() {
    let router = app().await;
    for (name, status, source) in [
        ("A", "new", "whatsapp"),
        ("B", "qualified", "website"),
        ("C", "converted", "whatsapp"),
        ("D", "converted", "manual"),
    ] {
        send(
            &router,
            "POST",
            "/api/leads",
            Some(API_KEY),
            Some(json!({ "name": name, "status": status, "source": source })),
        )
        .await;
    }

    let (status, analytics) = send(&router, "GET", "/api/analytics", Some(API_KEY), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(analytics["stats"]["totalLeads"], json!(4));
    assert_eq!(analytics["stats"]["conversionRate"], json!("50.0%"));
    assert_eq!(analytics["stats"]["revenueImpact"], json!("₹9660"));

    let funnel = analytics["funnelData"].as_array().unwrap();
    let converted = funnel
        .iter()
        .find(|s| s["stage"] == json!("Converted"))
        .unwrap();
    assert_eq!(converted["value"], json!(2));

    let sources = analytics["sourceData"].as_array().unwrap();
    let whatsapp = sources
        .iter()
        .find(|s| s["name"] == json!("Whatsapp"))
        .unwrap();
    assert_eq!(whatsapp["value"], json!(50));
}

#[tokio::test]
async fn dashboard_brief_falls_back_to_numbers() {
    let router = app_with(ScriptedAssistant::broken()).await;
    send(
        &router,
        "POST",
        "/api/leads",
        Some(API_KEY),
        Some(json!({ "name": "Jane Doe" })),
    )
    .await;
    let (status, body) = send(&router, "GET", "/api/dashboard/brief", Some(API_KEY), None).await;
    assert_eq!(status, StatusCode::OK);
    let brief = body["brief"].as_str().unwrap();
    assert!(brief.contains("1 total leads"));
}

#[tokio::test]
async fn onboarding_saves_profile_and_seeds_automations() {
    let router = app().await;
    let (status, body) = send(
        &router,
        "POST",
        "/api/account/onboarding",
        Some(API_KEY),
        Some(json!({
            "businessName": "Acme Dental",
            "industry": "Healthcare",
            "teamSize": "2-5",
            "integrations": {
                "whatsapp": { "apiKey": "wa-token", "phoneNumberId": "12345" },
                "websiteForms": true
            }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["onboardingComplete"], json!(true));

    let (_, flag) = send(
        &router,
        "GET",
        "/api/account/onboarding",
        Some(API_KEY),
        None,
    )
    .await;
    assert_eq!(flag["complete"], json!(true));

    let (_, automations) = send(&router, "GET", "/api/automations", Some(API_KEY), None).await;
    assert_eq!(automations["automations"].as_array().unwrap().len(), 3);

    let (_, integrations) = send(&router, "GET", "/api/integrations", Some(API_KEY), None).await;
    let whatsapp = integrations["integrations"]
        .as_array()
        .unwrap()
        .iter()
        .find(|i| i["platform"] == json!("whatsapp"))
        .unwrap();
    assert_eq!(whatsapp["status"], json!("connected"));
}
