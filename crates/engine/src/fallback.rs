//! Generic script used when personalization is unavailable

use chrono::Utc;
use uuid::Uuid;

use lead_engine_core::{
    CallObjective, LeadContext, PersonalizedScript, ScriptSection, ScriptSections, ScriptWarning,
    SectionKind, Strategy, StrategySource,
};

pub const FALLBACK_GENERATOR: &str = "fallback";

fn section(kind: SectionKind, content: &str, seconds: u32) -> ScriptSection {
    ScriptSection {
        kind,
        content: content.to_string(),
        key_points: Vec::new(),
        estimated_duration_seconds: seconds,
        personalized_elements: Vec::new(),
    }
}

fn closing_line(objective: CallObjective) -> &'static str {
    match objective {
        CallObjective::Qualification => {
            "Based on what you've shared, would it make sense to set up a follow-up conversation?"
        }
        CallObjective::Discovery => {
            "Thank you, that's really helpful. Could I send over a short summary and a suggested next step?"
        }
        CallObjective::DemoScheduling => {
            "Would you be open to a short demo this week? I can work around your calendar."
        }
        CallObjective::FollowUp => {
            "What would be the most useful next step from your side?"
        }
        CallObjective::Closing => {
            "Is there anything standing between us and getting started?"
        }
        CallObjective::Reengagement => {
            "Would it be worth a quick catch-up to see whether the timing is better now?"
        }
    }
}

/// Non-personalized script for a lead
///
/// Carries no placeholders, so it is trivially closed. Only the lead's
/// identity is used, and only to log; the text itself is generic.
pub fn fallback_script(
    context: &LeadContext,
    objective: CallObjective,
    reason: impl Into<String>,
) -> PersonalizedScript {
    let reason = reason.into();
    tracing::warn!(
        lead_id = %context.lead_id,
        objective = %objective,
        reason = %reason,
        "Serving fallback script"
    );

    let sections = ScriptSections {
        opening: section(
            SectionKind::Opening,
            "Hi, thanks for taking my call. Do you have a couple of minutes?",
            20,
        ),
        discovery: section(
            SectionKind::Discovery,
            "Could you tell me a bit about how your team handles this today and what you'd like to improve?",
            90,
        ),
        presentation: section(
            SectionKind::Presentation,
            "We help teams like yours save time and reduce cost in exactly that area.",
            60,
        ),
        objection_handling: Some(section(
            SectionKind::ObjectionHandling,
            "That's a fair concern. Many customers felt the same before trying it; what would you need to see to feel comfortable?",
            45,
        )),
        closing: section(SectionKind::Closing, closing_line(objective), 30),
    };
    let total = sections.total_duration_seconds();

    PersonalizedScript {
        id: Uuid::new_v4().to_string(),
        version: 1,
        parent_id: None,
        lead_id: context.lead_id.clone(),
        objective,
        strategy: Strategy::Consultative,
        strategy_source: StrategySource::Fallback,
        sections,
        estimated_duration_seconds: total,
        section_duration_seconds: total,
        warnings: vec![ScriptWarning::NotPersonalized { reason }],
        is_fallback: true,
        created_at: Utc::now(),
        generated_by: FALLBACK_GENERATOR.to_string(),
    }
}
