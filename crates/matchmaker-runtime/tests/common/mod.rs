//! Shared fixtures for the runtime integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use matchmaker_core::Profile;
use matchmaker_runtime::providers::{ChatMessage, CompletionConfig, CompletionResponse};
use matchmaker_runtime::{LlmProvider, ProviderError, TokenUsage};
use parking_lot::Mutex;

/// Which stage a prompt belongs to, read from its system prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Synthesis,
    Profil,
    Valeurs,
    Projection,
    Risques,
    Summary,
    FreeText,
}

impl Route {
    pub fn of(system_prompt: &str) -> Route {
        // The synthesis prompt is checked first: it is the only one asking for a global score.
        let routes = [
            ("\"score_global\"", Route::Synthesis),
            ("\"score_profil\"", Route::Profil),
            ("\"score_valeurs\"", Route::Valeurs),
            ("\"score_projection\"", Route::Projection),
            ("\"score_risques\"", Route::Risques),
            ("\"resume_psy\"", Route::Summary),
        ];
        routes
            .into_iter()
            .find(|(marker, _)| system_prompt.contains(marker))
            .map(|(_, route)| route)
            .unwrap_or(Route::FreeText)
    }

    fn default_reply(self) -> &'static str {
        match self {
            Route::Synthesis => MATCH_VERDICT,
            Route::Profil => {
                r#"{"score_profil": 82, "resume": "Both value directness.", "points_forts": ["communication"], "points_de_vigilance": ["pace"]}"#
            }
            Route::Valeurs => {
                r#"{"score_valeurs": 90, "compatibilites_clefs": ["respect", "family"], "conflits_potentiels": []}"#
            }
            Route::Projection => {
                r#"{"score_projection": 78, "vision_commune": ["long-term"], "risques_long_terme": ["relocation"]}"#
            }
            Route::Risques => {
                r#"{"score_risques": 85, "red_flags": [], "points_a_surveiller": ["work hours"]}"#
            }
            Route::Summary => {
                r#"{"resume_psy": "Steady.", "valeurs_clefs": ["respect"], "risques_relationnels": [], "dealbreakers_probables": [], "type_de_partenaire_recommande": "Kind."}"#
            }
            Route::FreeText => "Verdict: Compatible\n\nOverall score: 80/100",
        }
    }
}

pub const MATCH_VERDICT: &str = r#"{
  "verdict": "MATCH",
  "score_global": 84,
  "resume_executif": "Strong shared values and no red flags.",
  "forces_majeures": ["shared values", "clear communication"],
  "defis_principaux": ["distance"],
  "recommandation": "Plan a first meeting."
}"#;

type Reply = Result<String, ProviderError>;

/// Provider replaying scripted replies per route. A route's last scripted
/// reply repeats; unscripted routes get a valid default.
pub struct ScriptedProvider {
    scripts: Mutex<HashMap<Route, VecDeque<Reply>>>,
    calls: Mutex<HashMap<Route, u32>>,
    delay: Duration,
    route_delays: HashMap<Route, Duration>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            delay: Duration::ZERO,
            route_delays: HashMap::new(),
        }
    }

    pub fn script(self, route: Route, replies: Vec<Reply>) -> Self {
        self.scripts.lock().insert(route, replies.into());
        self
    }

    pub fn reply(self, route: Route, text: &str) -> Self {
        self.script(route, vec![Ok(text.to_string())])
    }

    /// Every completion takes `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Overrides the delay for one route.
    pub fn with_route_delay(mut self, route: Route, delay: Duration) -> Self {
        self.route_delays.insert(route, delay);
        self
    }

    pub fn calls(&self, route: Route) -> u32 {
        self.calls.lock().get(&route).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.calls.lock().values().sum()
    }

    fn next_reply(&self, route: Route) -> Reply {
        let mut scripts = self.scripts.lock();
        match scripts.get_mut(&route) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_else(|| Err(ProviderError::EmptyResponse)),
            Some(queue) => queue.front().cloned().unwrap_or_else(|| Err(ProviderError::EmptyResponse)),
            None => Ok(route.default_reply().to_string()),
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let route = Route::of(&messages[0].content);
        *self.calls.lock().entry(route).or_insert(0) += 1;

        let delay = self.route_delays.get(&route).copied().unwrap_or(self.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let content = self.next_reply(route)?;
        Ok(CompletionResponse {
            content,
            usage: TokenUsage {
                prompt_tokens: 200,
                completion_tokens: 50,
            },
            model: config.model.clone(),
            stop_reason: Some("stop".to_string()),
        })
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Two profiles with the same declared values and no red flags.
pub fn aligned_pair() -> (Profile, Profile) {
    let mut a = Profile::new("u-amelie", "Amelie");
    a.age = Some(31);
    a.city = Some("Lyon".to_string());
    a.values = vec!["respect".into(), "family".into(), "ambition".into()];
    a.non_negotiables = vec!["loyalty".into()];
    a.relationship_goal = Some("marriage".to_string());

    let mut b = Profile::new("u-ravi", "Ravi");
    b.age = Some(33);
    b.city = Some("Lyon".to_string());
    b.values = a.values.clone();
    b.non_negotiables = vec!["loyalty".into()];
    b.relationship_goal = Some("marriage".to_string());

    (a, b)
}
