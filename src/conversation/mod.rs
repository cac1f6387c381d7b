// Conversation orchestration
// One turn: retrieve passages, assemble the prompt, generate, record history

pub mod prompt;
pub mod session;


use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::Config;
use crate::generation::Generator;
use crate::index::SearchHit;
use crate::retriever::{DEFAULT_TOP_K, RetrievalOptions, Retriever};
use crate::{RagError, Result};

pub use session::{Session, SessionStore, Turn};

/// Longest excerpt returned per source, in characters
pub const DEFAULT_EXCERPT_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorOptions {
    pub top_k: usize,
    /// Number of past turns replayed to the generator
    pub max_history_turns: usize,
    /// Apply the programmatic date filter before ranking
    pub upcoming_only: bool,
    pub excerpt_chars: usize,
}

impl Default for OrchestratorOptions {
    #[inline]
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            max_history_turns: 10,
            upcoming_only: false,
            excerpt_chars: DEFAULT_EXCERPT_CHARS,
        }
    }
}

impl OrchestratorOptions {
    #[inline]
    pub fn from_config(config: &Config) -> Self {
        Self {
            top_k: config.retrieval.top_k,
            max_history_turns: config.sessions.max_history_turns,
            upcoming_only: config.retrieval.upcoming_only,
            ..Self::default()
        }
    }
}

/// A passage the answer was grounded on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Source {
    pub event_id: String,
    pub excerpt: String,
}

impl Source {
    #[inline]
    pub fn from_hit(hit: &SearchHit, max_chars: usize) -> Self {
        Self {
            event_id: hit.metadata.event_id.clone(),
            excerpt: excerpt(&hit.metadata.text, max_chars),
        }
    }
}

/// Cut `text` to at most `max_chars` characters, never inside a character
#[inline]
pub fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => {
            let head = text.get(..cut).unwrap_or(text).trim_end();
            format!("{}…", head)
        }
        None => text.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    pub question: String,
    pub answer: String,
    pub sources: Vec<Source>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Answers questions against the shared index, keeping per-session history
#[derive(Clone)]
pub struct Orchestrator {
    retriever: Retriever,
    generator: Arc<dyn Generator>,
    sessions: Arc<SessionStore>,
    options: OrchestratorOptions,
}

impl std::fmt::Debug for Orchestrator {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("retriever", &self.retriever)
            .field("sessions", &self.sessions.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    #[inline]
    pub fn new(
        retriever: Retriever,
        generator: Arc<dyn Generator>,
        sessions: Arc<SessionStore>,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            retriever,
            generator,
            sessions,
            options,
        }
    }

    #[inline]
    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    #[inline]
    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Answer `question`, continuing the conversation `session_id` if given
    ///
    /// Turns of one session run one at a time. History only grows when the
    /// generator produced an answer.
    #[inline]
    pub async fn ask(&self, session_id: Option<&str>, question: &str) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::Retrieval("question is empty".to_string()));
        }

        let Some(id) = session_id else {
            let (answer, sources) = self.answer_turn(&[], question).await?;
            return Ok(Answer {
                question: question.to_string(),
                answer,
                sources,
                session_id: None,
            });
        };

        let handle = self.sessions.checkout(id);
        let mut session = handle.lock().await;

        let history = session.recent(self.options.max_history_turns);
        debug!(
            "Session {}: answering with {} prior turns",
            id,
            history.len()
        );
        let (answer, sources) = self.answer_turn(history, question).await?;

        session.push(Turn {
            question: question.to_string(),
            answer: answer.clone(),
        });
        drop(session);
        self.sessions.touch(id);

        Ok(Answer {
            question: question.to_string(),
            answer,
            sources,
            session_id: Some(id.to_string()),
        })
    }

    async fn answer_turn(&self, history: &[Turn], question: &str) -> Result<(String, Vec<Source>)> {
        let now = Utc::now();

        let mut options = RetrievalOptions::top(self.options.top_k);
        if self.options.upcoming_only {
            options = options.upcoming_after(now);
        }

        let hits = self.retriever.retrieve_with(question, &options).await?;
        let prompt = prompt::build_prompt(now.date_naive(), &hits, history, question);

        let answer = self.generator.complete(&prompt).await?;
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(RagError::Generation(
                "generator returned an empty answer".to_string(),
            ));
        }

        info!("Answered question using {} passages", hits.len());

        let sources = hits
            .iter()
            .map(|hit| Source::from_hit(hit, self.options.excerpt_chars))
            .collect();
        Ok((answer.to_string(), sources))
    }

    /// Forget the history of `session_id`
    #[inline]
    pub fn clear_session(&self, session_id: &str) -> bool {
        self.sessions.clear(session_id)
    }
}
