//! Classification prompt construction.

use riskclause_shared::{CanonicalTermSet, PageText};

use crate::client::{ChatMessage, ChatRequest};

/// Longest page text sent in one request, in characters.
pub const MAX_PAGE_CHARS: usize = 16_000;

const RULES: &str = "\
Follow these rules:
1. Only use the keys that already exist in the JSON object.
2. Do not create new keys.
3. Respond with JSON that has exactly the structure of the JSON object.
4. Copy the relevant sentences of the text into the value of the matching key, as strings.
5. If a relevant sentence is very long, summarize it in one or two sentences.";

/// Build the chat request that classifies one page against `terms`.
pub fn build_request(model: &str, page: &PageText, terms: &CanonicalTermSet) -> ChatRequest {
    let skeleton = serde_json::to_string_pretty(&terms.skeleton()).unwrap_or_else(|_| "{}".into());

    let system = format!(
        "You review business contracts for risk. This JSON object lists the contractual \
         terms of interest:\n{skeleton}\n\nSort the sentences of the contract text you are \
         given under these terms.\n\n{RULES}"
    );

    let user = format!(
        "Answer with a JSON object in the format above. Pure JSON, no commentary.\n\n{}",
        truncate_chars(&page.content, MAX_PAGE_CHARS)
    );

    ChatRequest {
        model: model.to_string(),
        messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
    }
}

/// Cut `text` to at most `max` characters on a char boundary.
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
