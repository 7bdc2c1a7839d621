//! The four specialist agents.
//!
//! Each agent pairs a system prompt with an output schema and formats its
//! own user prompt from the part of the two profiles it looks at:
//!
//! | agent | looks at |
//! |---|---|
//! | profil | age, emotional needs, communication style, details |
//! | valeurs | values, non-negotiables, culture openness, goal |
//! | projection | age, location, goal, family situation, details |
//! | risques | non-negotiables, red flags, communication style, details |

mod profile;
mod projection;
mod risks;
mod traits;
mod values;

use matchmaker_core::{AgentKind, Profile};
use serde_json::Value;

pub use profile::ProfilAgent;
pub use projection::ProjectionAgent;
pub use risks::RisquesAgent;
pub use traits::{AgentError, SpecialistAgent};
pub use values::ValeursAgent;

/// Build the agent for `kind`.
pub fn create_agent(kind: AgentKind) -> Box<dyn SpecialistAgent> {
    match kind {
        AgentKind::Profil => Box::new(ProfilAgent::new()),
        AgentKind::Valeurs => Box::new(ValeursAgent::new()),
        AgentKind::Projection => Box::new(ProjectionAgent::new()),
        AgentKind::Risques => Box::new(RisquesAgent::new()),
    }
}

/// Resolve an agent by name (`profil`, `values`, ...).
pub fn agent_by_name(name: &str) -> Result<Box<dyn SpecialistAgent>, AgentError> {
    let kind = name
        .parse::<AgentKind>()
        .map_err(|_| AgentError::UnknownAgent(name.to_string()))?;
    Ok(create_agent(kind))
}

const NOT_SPECIFIED: &str = "not specified";

pub(crate) fn or_unspecified(value: Option<&str>) -> &str {
    value.filter(|v| !v.trim().is_empty()).unwrap_or(NOT_SPECIFIED)
}

fn age_line(profile: &Profile) -> String {
    profile
        .age
        .map(|age| age.to_string())
        .unwrap_or_else(|| NOT_SPECIFIED.to_string())
}

pub(crate) fn json_list(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

fn details(profile: &Profile) -> String {
    match &profile.raw_profile {
        Value::Null => "{}".to_string(),
        other => other.to_string(),
    }
}

/// One person's section of a user prompt.
fn person_section(label: &str, profile: &Profile, lines: &[(&str, String)]) -> String {
    let mut section = format!("PERSON {}:\nName: {}\n", label, profile.name);
    for (key, value) in lines {
        section.push_str(key);
        section.push_str(": ");
        section.push_str(value);
        section.push('\n');
    }
    section
}

#[cfg(test)]
pub(crate) mod fixtures {
    use matchmaker_core::Profile;

    pub fn sophie() -> Profile {
        let mut p = Profile::new("u-sophie", "Sophie");
        p.age = Some(29);
        p.city = Some("Paris".to_string());
        p.country = Some("France".to_string());
        p.values = vec!["respect".to_string(), "family".to_string()];
        p.non_negotiables = vec!["loyalty".to_string()];
        p.emotional_needs = vec!["reassurance".to_string()];
        p.red_flags = vec!["repeated lies".to_string()];
        p.relationship_goal = Some("long-term".to_string());
        p.culture_openness = vec!["tamil".to_string()];
        p.family_situation = Some("no children".to_string());
        p.communication_style = Some("direct".to_string());
        p.raw_profile = serde_json::json!({"bio": "project manager, loves hiking"});
        p
    }

    pub fn karthik() -> Profile {
        let mut p = Profile::new("u-karthik", "Karthik");
        p.values = vec!["respect".to_string(), "ambition".to_string()];
        p.red_flags = vec!["disrespect".to_string()];
        p
    }
}
