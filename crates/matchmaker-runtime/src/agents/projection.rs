//! Long-term life-plan compatibility.

use async_trait::async_trait;
use matchmaker_core::{AgentKind, ExpectedSchema, Profile, ProfilePair};

use super::{age_line, details, or_unspecified, person_section, SpecialistAgent};
use crate::prompts::{structured, PROJECTION_SYSTEM_PROMPT};

/// Looks at where two people want to be in five or ten years.
pub struct ProjectionAgent {
    system_prompt: String,
}

impl ProjectionAgent {
    pub fn new() -> Self {
        Self {
            system_prompt: structured(PROJECTION_SYSTEM_PROMPT),
        }
    }
}

impl Default for ProjectionAgent {
    fn default() -> Self {
        Self::new()
    }
}

fn location(p: &Profile) -> String {
    format!(
        "{}, {}",
        or_unspecified(p.city.as_deref()),
        or_unspecified(p.country.as_deref())
    )
}

#[async_trait]
impl SpecialistAgent for ProjectionAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Projection
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn schema(&self) -> ExpectedSchema {
        ExpectedSchema::new()
            .number("score_projection")
            .array("vision_commune")
            .array("risques_long_terme")
    }

    fn user_prompt(&self, pair: ProfilePair<'_>) -> String {
        let section = |label, p: &Profile| {
            person_section(
                label,
                p,
                &[
                    ("Age", age_line(p)),
                    ("Location", location(p)),
                    (
                        "Relationship goal",
                        or_unspecified(p.relationship_goal.as_deref()).to_string(),
                    ),
                    (
                        "Family situation",
                        or_unspecified(p.family_situation.as_deref()).to_string(),
                    ),
                    ("Detailed profile", details(p)),
                ],
            )
        };

        format!(
            "Assess whether these two people can build a shared future:\n\n{}\n{}\nReturn the result as strict JSON.",
            section("A", pair.a),
            section("B", pair.b)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::fixtures::{karthik, sophie};

    #[test]
    fn test_location_line() {
        assert_eq!(location(&sophie()), "Paris, France");
        assert_eq!(location(&karthik()), "not specified, not specified");
    }
}
