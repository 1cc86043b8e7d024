use minijinja::{context, Environment};

use crate::types::{PipelineStats, User};

const CLASSIFY_TEMPLATE: &str = include_str!("prompts/classify.j2");
const AUTO_REPLY_TEMPLATE: &str = include_str!("prompts/auto_reply.j2");
const OUTREACH_TEMPLATE: &str = include_str!("prompts/outreach.j2");
const SUMMARY_TEMPLATE: &str = include_str!("prompts/summary.j2");
const HEALTH_BRIEF_TEMPLATE: &str = include_str!("prompts/health_brief.j2");

fn render(name: &str, template: &str, ctx: minijinja::Value) -> Option<String> {
    let mut env = Environment::new();
    env.add_template(name, template).ok()?;
    let template = env.get_template(name).ok()?;
    template.render(ctx).ok()
}

pub fn render_classify_prompt(message: &str) -> String {
    render("classify", CLASSIFY_TEMPLATE, context! { message })
        .unwrap_or_else(|| fallback_classify_prompt(message))
}

fn fallback_classify_prompt(message: &str) -> String {
    format!(
        "You are an AI sales assistant analyzing an incoming customer message.\n\
         Return a JSON object with \"intent\" (short summary), \"sentiment\" \
         (\"positive\", \"neutral\" or \"negative\") and \"leadScore\" (integer 0-100).\n\
         Analyze this message:\n\"{message}\"\n\
         Format: JSON only, strictly matching the keys above. No other text."
    )
}

fn or_default<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.trim().is_empty() {
        default
    } else {
        value.trim()
    }
}

/// System-style context for the reply generator, filled from the tenant's
/// business profile.
pub fn render_auto_reply_context(profile: &User) -> String {
    let business_name = or_default(&profile.business_name, "Our Company");
    let industry = or_default(&profile.industry, "General");
    let business_hours = or_default(&profile.business_hours, "9 AM to 6 PM");
    render(
        "auto_reply",
        AUTO_REPLY_TEMPLATE,
        context! { business_name, industry, business_hours },
    )
    .unwrap_or_else(|| {
        format!(
            "You are an AI sales agent for the following business:\n\
             Name: {business_name}\nIndustry: {industry}\nHours: {business_hours}\n\
             Reply to the user's latest message helpfully, professionally and concisely. \
             Keep it under 3 sentences if possible. Push for a meeting or clear next step."
        )
    })
}

pub struct OutreachContext<'a> {
    pub name: &'a str,
    pub channel: &'a str,
    pub tone: &'a str,
    pub email: &'a str,
    pub score: i32,
    pub sentiment: &'a str,
    pub status: &'a str,
    pub tags: &'a [String],
}

pub fn render_outreach_prompt(ctx: &OutreachContext<'_>) -> String {
    let email = or_default(ctx.email, "unknown");
    let tags = if ctx.tags.is_empty() {
        "none".to_string()
    } else {
        ctx.tags.join(", ")
    };
    render(
        "outreach",
        OUTREACH_TEMPLATE,
        context! {
            name => ctx.name,
            channel => ctx.channel,
            tone => ctx.tone,
            email => email,
            score => ctx.score,
            sentiment => ctx.sentiment,
            status => ctx.status,
            tags => tags,
        },
    )
    .unwrap_or_else(|| {
        format!(
            "Write a {} outreach message to {} via {}. Their email is {}, their score is {}/100, \
             sentiment: {}. Status: {}. Tags: {}. Keep it under 4 sentences, include a clear \
             call-to-action, no subject lines or labels.",
            ctx.tone, ctx.name, ctx.channel, email, ctx.score, ctx.sentiment, ctx.status, tags
        )
    })
}

pub fn render_summary_prompt(transcript: &str) -> String {
    render("summary", SUMMARY_TEMPLATE, context! { transcript }).unwrap_or_else(|| {
        format!(
            "Summarize this sales conversation in exactly 2-3 concise sentences. \
             Focus on what the customer wants, current status and recommended next action.\n\
             Conversation:\n{transcript}\nSummary:"
        )
    })
}

pub fn render_health_brief_prompt(stats: &PipelineStats) -> String {
    render(
        "health_brief",
        HEALTH_BRIEF_TEMPLATE,
        context! {
            total_leads => stats.total_leads,
            new_leads => stats.new_leads,
            hot_leads => stats.hot_leads,
            cold_leads => stats.cold_leads,
            converted_leads => stats.converted_leads,
            negative_conversations => stats.negative_conversations,
        },
    )
    .unwrap_or_else(|| {
        format!(
            "You are an AI sales coach. Generate a short 2-3 sentence daily brief from this \
             pipeline: {} total leads, {} new today, {} hot (score > 80), {} cold (score < 30), \
             {} converted, {} negative sentiment conversations.",
            stats.total_leads,
            stats.new_leads,
            stats.hot_leads,
            stats.cold_leads,
            stats.converted_leads,
            stats.negative_conversations
        )
    })
}
