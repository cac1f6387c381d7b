
use chrono::{DateTime, NaiveDate, Utc};
use std::fmt::Write;

use super::session::Turn;
use crate::generation::Prompt;
use crate::index::{PassageMetadata, SearchHit};

const DATE_FORMAT: &str = "%d/%m/%Y";

/// System instruction for a conversation held on `today`
#[inline]
pub fn system_instruction(today: NaiveDate) -> String {
    format!(
        "Tu es un assistant spécialisé dans les événements culturels. \
         Nous sommes le {today}.\n\
         \n\
         Réponds uniquement à partir des événements fournis dans le contexte ; \
         n'invente aucun événement, lieu ou horaire.\n\
         Privilégie TOUJOURS les événements à venir. Si tous les événements \
         trouvés sont passés, précise-le clairement en disant \
         \"Cet événement a déjà eu lieu le [date]\".\n\
         Si aucun événement ne correspond à la question, dis-le et propose \
         des alternatives ou demande des précisions.\n\
         Réponds de manière naturelle, chaleureuse et précise.",
        today = today.format(DATE_FORMAT)
    )
}

fn describe_dates(passage: &PassageMetadata) -> String {
    let format = |date: DateTime<Utc>| date.format(DATE_FORMAT).to_string();
    match (passage.starts_at, passage.ends_at) {
        (Some(start), Some(end)) if start.date_naive() != end.date_naive() => {
            format!("du {} au {}", format(start), format(end))
        }
        (Some(date), _) | (None, Some(date)) => format!("le {}", format(date)),
        (None, None) => "non précisées".to_string(),
    }
}

/// Render retrieved passages as the context block of the final message
#[inline]
pub fn format_context(hits: &[SearchHit]) -> String {
    let mut context = String::new();
    for (position, hit) in hits.iter().enumerate() {
        let passage = &hit.metadata;
        if position > 0 {
            context.push('\n');
        }
        let _ = writeln!(
            context,
            "Événement {} (id : {})",
            position + 1,
            passage.event_id
        );
        let _ = writeln!(context, "Titre : {}", passage.title);
        if !passage.location.is_empty() {
            let _ = writeln!(context, "Lieu : {}", passage.location);
        }
        let _ = writeln!(context, "Dates : {}", describe_dates(passage));
        let _ = writeln!(context, "Extrait : {}", passage.text);
    }
    context
}

/// Assemble the full prompt for one turn
///
/// Prior turns become alternating user/assistant messages; the retrieved
/// context and the new question form the final user message.
#[inline]
pub fn build_prompt(today: NaiveDate, hits: &[SearchHit], history: &[Turn], question: &str) -> Prompt {
    let mut prompt = Prompt::new(system_instruction(today));

    for turn in history {
        prompt.push_user(turn.question.as_str());
        prompt.push_assistant(turn.answer.as_str());
    }

    prompt.push_user(format!(
        "Contexte des événements trouvés :\n\n{}\nQuestion : {}",
        format_context(hits),
        question
    ));

    prompt
}
