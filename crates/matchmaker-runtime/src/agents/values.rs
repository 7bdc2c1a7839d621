//! Values and lifestyle compatibility.

use async_trait::async_trait;
use matchmaker_core::{AgentKind, ExpectedSchema, Profile, ProfilePair};

use super::{json_list, or_unspecified, person_section, SpecialistAgent};
use crate::prompts::{structured, VALEURS_SYSTEM_PROMPT};

pub struct ValeursAgent {
    system_prompt: String,
}

impl ValeursAgent {
    pub fn new() -> Self {
        Self {
            system_prompt: structured(VALEURS_SYSTEM_PROMPT),
        }
    }

    fn section(label: &str, p: &Profile) -> String {
        person_section(
            label,
            p,
            &[
                ("Values", json_list(&p.values)),
                ("Non-negotiables", json_list(&p.non_negotiables)),
                ("Culture openness", json_list(&p.culture_openness)),
                (
                    "Relationship goal",
                    or_unspecified(p.relationship_goal.as_deref()).to_string(),
                ),
            ],
        )
    }
}

impl Default for ValeursAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpecialistAgent for ValeursAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Valeurs
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn schema(&self) -> ExpectedSchema {
        ExpectedSchema::new()
            .number("score_valeurs")
            .array("compatibilites_clefs")
            .array("conflits_potentiels")
    }

    fn user_prompt(&self, pair: ProfilePair<'_>) -> String {
        format!(
            "Compare the values and lifestyles of these two people:\n\n{}\n{}\nReturn the result as strict JSON.",
            Self::section("A", pair.a),
            Self::section("B", pair.b)
        )
    }
}
