//! Psychological and emotional compatibility.

use async_trait::async_trait;
use matchmaker_core::{AgentKind, ExpectedSchema, ProfilePair};

use super::{age_line, details, json_list, or_unspecified, person_section, SpecialistAgent};
use crate::prompts::{structured, PROFIL_SYSTEM_PROMPT};

/// Scores how two temperaments and sets of emotional needs fit together.
pub struct ProfilAgent {
    system_prompt: String,
}

impl ProfilAgent {
    pub fn new() -> Self {
        Self {
            system_prompt: structured(PROFIL_SYSTEM_PROMPT),
        }
    }
}

impl Default for ProfilAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpecialistAgent for ProfilAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Profil
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn schema(&self) -> ExpectedSchema {
        ExpectedSchema::new()
            .number("score_profil")
            .string("resume")
            .array("points_forts")
            .array("points_de_vigilance")
    }

    fn user_prompt(&self, pair: ProfilePair<'_>) -> String {
        let section = |label, p: &matchmaker_core::Profile| {
            person_section(
                label,
                p,
                &[
                    ("Age", age_line(p)),
                    ("Emotional needs", json_list(&p.emotional_needs)),
                    (
                        "Communication style",
                        or_unspecified(p.communication_style.as_deref()).to_string(),
                    ),
                    ("Detailed profile", details(p)),
                ],
            )
        };

        format!(
            "Assess the psychological compatibility of these two people:\n\n{}\n{}\nReturn the result as strict JSON.",
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
    fn test_prompt_covers_emotional_lens() {
        let (a, b) = (sophie(), karthik());
        let prompt = ProfilAgent::new().user_prompt(ProfilePair::new(&a, &b).unwrap());
        assert!(prompt.contains("Emotional needs: [\"reassurance\"]"));
        assert!(prompt.contains("Communication style: direct"));
        assert!(!prompt.contains("Red flags"));
    }
}
