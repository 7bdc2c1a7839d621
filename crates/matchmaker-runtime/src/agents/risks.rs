//! Red flags and relational risks.
//!
//! A low `score_risques` means high risk. The score is bounds-checked like
//! any other; a pair with serious red flags still yields a valid result.

use async_trait::async_trait;
use matchmaker_core::{AgentKind, ExpectedSchema, Profile, ProfilePair};

use super::{details, json_list, or_unspecified, person_section, SpecialistAgent};
use crate::prompts::{structured, RISQUES_SYSTEM_PROMPT};

pub struct RisquesAgent {
    system_prompt: String,
}

impl RisquesAgent {
    pub fn new() -> Self {
        Self {
            system_prompt: structured(RISQUES_SYSTEM_PROMPT),
        }
    }
}

impl Default for RisquesAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpecialistAgent for RisquesAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Risques
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn schema(&self) -> ExpectedSchema {
        ExpectedSchema::new()
            .number("score_risques")
            .array("red_flags")
            .array("points_a_surveiller")
    }

    fn user_prompt(&self, pair: ProfilePair<'_>) -> String {
        let section = |label, p: &Profile| {
            person_section(
                label,
                p,
                &[
                    ("Non-negotiables", json_list(&p.non_negotiables)),
                    ("Known red flags", json_list(&p.red_flags)),
                    (
                        "Communication style",
                        or_unspecified(p.communication_style.as_deref()).to_string(),
                    ),
                    ("Detailed profile", details(p)),
                ],
            )
        };

        format!(
            "Identify the risks and red flags between these two people:\n\n{}\n{}\nReturn the result as strict JSON.",
            section("A", pair.a),
            section("B", pair.b)
        )
    }
}
