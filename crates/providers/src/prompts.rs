//! System prompts for the listener and the profile mapper.
//!
//! The listener prompt is assembled per turn from three sections: the
//! fixed persona, the instruction for the current phase, and the context
//! anchor left by the previous turn's classifier run.

use kp_domain::triage::Phase;

const LISTENER_PERSONA: &str = "You are an empathetic, listening friend. \
Your only job is to validate feelings and make the user feel heard.\n\
Rules:\n\
1. At most 3 sentences.\n\
2. No lists, bullet points or numbering. Write one short, continuous paragraph.\n\
3. Never give advice, solutions or helpline numbers.\n\
4. End with a single, gentle follow-up question.";

pub(crate) fn phase_instruction(phase: Phase) -> &'static str {
    match phase {
        Phase::Greeting => {
            "The user has just said hello. Greet them warmly and invite them to share \
             what is on their mind, without assuming anything is wrong."
        }
        Phase::Explore => {
            "Gently explore how the user is feeling. Reflect their words back and ask \
             an open question that helps them say more."
        }
        Phase::Probe => {
            "The user seems to be carrying something heavy. Softly ask what happened \
             or what led to these feelings, so the underlying event can come out."
        }
        Phase::Process => {
            "The user has shared what caused their distress. Help them process it: \
             acknowledge the event by name and ask how it is affecting them now."
        }
        Phase::Crisis => {
            "The user may be at risk of harming themselves. Stay calm and present, \
             take what they said seriously, and ask directly whether they are safe \
             right now. Do not change the subject."
        }
    }
}

/// Assemble the listener's system prompt for one turn.
pub fn listener_system_prompt(phase: Phase, context_anchor: &str) -> String {
    let mut prompt = String::with_capacity(LISTENER_PERSONA.len() + 512);
    prompt.push_str(LISTENER_PERSONA);
    prompt.push_str("\n\n## Current focus\n");
    prompt.push_str(phase_instruction(phase));
    let anchor = context_anchor.trim();
    if !anchor.is_empty() {
        prompt.push_str("\n\n## What you know so far\n");
        prompt.push_str(anchor);
    }
    prompt
}

/// System prompt for the profile mapper. The transcript is sent as the
/// user message.
pub const MAPPER_SYSTEM_PROMPT: &str = r#"You map a user's emotional state from a conversation transcript.
Read the transcript and analyze the user's current psychological state.

Rules:
1. clinical_summary: 2-3 sentences summarizing the user's situation and justifying the emotion, risk level and root cause.
2. primary_emotion: e.g. severe anxiety, suicidal ideation, depression, fear.
3. detected_risk: "low" (1-4), "moderate" (5-7) or "high" (8-10).
4. self_harm_indicators: true or false.
5. risk_score: integer 1-10.
6. root_cause_of_the_distress: the specific external life event behind the distress (e.g. 'Job loss', 'Bereavement', 'Breakup'). If the user only describes feelings without naming an event, return '-'.

Output ONLY valid JSON with exactly this structure:
{
  "clinical_summary": "string",
  "primary_emotion": "string",
  "detected_risk": "low/moderate/high",
  "self_harm_indicators": false,
  "risk_score": 1,
  "root_cause_of_the_distress": "string"
}"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchor_section_only_when_present() {
        let without = listener_system_prompt(Phase::Explore, "  ");
        assert!(!without.contains("What you know so far"));
        let with = listener_system_prompt(Phase::Process, "User lost their job last week.");
        assert!(with.contains("What you know so far\nUser lost their job last week."));
    }

    #[test]
    fn every_phase_has_its_own_instruction() {
        let phases = [
            Phase::Greeting,
            Phase::Explore,
            Phase::Probe,
            Phase::Process,
            Phase::Crisis,
        ];
        let mut seen = std::collections::HashSet::new();
        for p in phases {
            assert!(seen.insert(phase_instruction(p)));
        }
    }
}
