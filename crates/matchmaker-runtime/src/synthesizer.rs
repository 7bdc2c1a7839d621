//! Synthesis: four specialist results in, one verdict out.
//!
//! The synthesizer sees the agent results verbatim and nothing else. It is
//! the only place where they are weighed against each other.

use matchmaker_core::{AgentBundle, AgentKind, ProfilePair, Verdict};
use tokio_util::sync::CancellationToken;

use crate::prompts::{structured, SYNTHESIS_SYSTEM_PROMPT};
use crate::structured::{CallOptions, StructuredCallError, StructuredCaller, StructuredOutcome};

fn agent_heading(kind: AgentKind) -> &'static str {
    match kind {
        AgentKind::Profil => "PROFILE AGENT",
        AgentKind::Valeurs => "VALUES AGENT",
        AgentKind::Projection => "PROJECTION AGENT",
        AgentKind::Risques => "RISKS AGENT",
    }
}

/// User prompt embedding every agent result with its score.
pub fn synthesis_user_prompt(pair: ProfilePair<'_>, bundle: &AgentBundle) -> String {
    let mut prompt = format!(
        "Results of the four specialist agents for {} and {}:\n\n",
        pair.a.name, pair.b.name
    );

    for (kind, result) in bundle.iter() {
        let score = bundle
            .score(kind)
            .map(|s| s.to_string())
            .unwrap_or_else(|| "?".to_string());
        prompt.push_str(&format!(
            "{} (score: {}/100):\n{}\n\n",
            agent_heading(kind),
            score,
            result.to_pretty_json()
        ));
    }

    prompt.push_str("Weigh these analyses and return the final verdict as strict JSON.");
    prompt
}

/// The fifth structured call.
#[derive(Debug, Clone)]
pub struct Synthesizer {
    system_prompt: String,
}

impl Synthesizer {
    pub fn new() -> Self {
        Self {
            system_prompt: structured(SYNTHESIS_SYSTEM_PROMPT),
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Ask for a verdict. An unknown category fails the attempt, like any
    /// other validation error.
    pub async fn synthesize(
        &self,
        caller: &StructuredCaller,
        pair: ProfilePair<'_>,
        bundle: &AgentBundle,
        options: &CallOptions,
        cancel: &CancellationToken,
    ) -> Result<StructuredOutcome<Verdict>, StructuredCallError> {
        let user_prompt = synthesis_user_prompt(pair, bundle);
        caller
            .call_decoded(
                &self.system_prompt,
                &user_prompt,
                &Verdict::schema(),
                options,
                cancel,
                |result| Verdict::try_from(&result),
            )
            .await
    }
}

impl Default for Synthesizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matchmaker_core::{Profile, StructuredResult};
    use serde_json::json;

    fn result(value: serde_json::Value) -> StructuredResult {
        match value {
            serde_json::Value::Object(map) => StructuredResult::new(map),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_prompt_embeds_scores_and_results() {
        let a = Profile::new("a", "Sophie");
        let b = Profile::new("b", "Karthik");
        let bundle = AgentBundle {
            profil: result(json!({"score_profil": 81, "resume": "warm"})),
            valeurs: result(json!({"score_valeurs": 72.5})),
            projection: result(json!({"score_projection": 64})),
            risques: result(json!({"score_risques": 20, "red_flags": ["violence"]})),
        };

        let prompt = synthesis_user_prompt(ProfilePair::new(&a, &b).unwrap(), &bundle);

        assert!(prompt.contains("for Sophie and Karthik"));
        assert!(prompt.contains("PROFILE AGENT (score: 81/100)"));
        assert!(prompt.contains("VALUES AGENT (score: 72.5/100)"));
        assert!(prompt.contains("RISKS AGENT (score: 20/100)"));
        assert!(prompt.contains("\"red_flags\": [\n"));
        assert!(prompt.contains("\"resume\": \"warm\""));

        let profil_at = prompt.find("PROFILE AGENT").unwrap();
        let risques_at = prompt.find("RISKS AGENT").unwrap();
        assert!(profil_at < risques_at);
    }
}
