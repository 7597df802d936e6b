//! Prompt text for the three model calls of a request.
//!
//! - Tool decision: domain, the single search tool, history, question
//! - Answer synthesis: rules, history, retrieved context, question, and the
//!   mandatory JSON output format
//! - History summary

use super::types::{render_transcript, ConversationTurn};

// ─── Constants ──────────────────────────────────────────────────────────────

/// Marker placed between tool outputs in the context block.
pub const CONTEXT_SEPARATOR: &str = "\n\n--- Retrieved Documents ---\n\n";

/// Prefix of the synthetic system turn that replaces summarized history.
pub const SUMMARY_PREFIX: &str = "Previous conversation summary: ";

/// Identity shared by both answer prompts.
const ASSISTANT_IDENTITY: &str = "\
You are a real-estate assistant for the Vietnamese market. You know listings, \
market data, price trends, taxes, legal procedures and investment analysis for \
the major cities (Ho Chi Minh City, Hanoi, Da Nang).";

const TOOL_DECISION_RULES: &str = "\
Available tool:\n\
- search_docs: searches the document corpus (listings from Batdongsan.com.vn, \
Alonhadat.com.vn and Chotot.com, market data, price indices, tax rules, \
transaction procedures, articles and analysis).\n\n\
Rules:\n\
1. Answer directly when you are confident.\n\
2. Call search_docs when the question needs location-specific details, \
statistics, legal requirements, recent policy or procedure steps.\n\
3. Use proper JSON types in tool arguments: top_k is an integer, with_score is \
true or false, metadata_filter is an object. Never send \"3\" or \"True\".\n\
4. The search_docs query MUST be exactly the user's question shown below. Do not \
rewrite, translate, expand or change its topic.\n\
5. If the question is not about real estate, do NOT call any tool. Say it is \
out of scope and invite a real-estate question.\n\n\
Answer style:\n\
- Reply in the same language as the question (Vietnamese in, Vietnamese out; \
English in, English out). Never mix languages.\n\
- Be accurate, neutral and concise.\n\
- Use markdown headings and bold text where it helps.";

const SYNTHESIS_RULES: &str = "\
Mandatory rules:\n\
1. LANGUAGE: the answer MUST be in the language of the QUESTION, entirely, even \
when the CONTEXT is written in another language.\n\
2. PROCESS: read the QUESTION for intent, find the relevant facts in CHAT HISTORY \
and CONTEXT, then write the answer.\n\n\
Content:\n\
- Use only the CONTEXT and your trained knowledge. Do not speculate. When the \
information is not enough, say so and ask the user for details.\n\
- Keep the tone friendly and plain.\n\
- Use lists or tables only when they make the information clearer.";

/// JSON shape the synthesis call must return.
pub const STRUCTURED_OUTPUT_SUFFIX: &str = r#"OUTPUT FORMAT (MANDATORY)

Reply with a single JSON object and nothing else:
{
  "response": "<natural language answer to the user>",
  "result": [
    {
      "title": "...",
      "address": [
        {"street": "...", "ward": "...", "district": "...", "city": "...", "latitude": 0, "longitude": 0}
      ],
      "description": "...",
      "propertyType": "...",
      "transactionType": "...",
      "legalStatus": "...",
      "price": 0,
      "priceUnit": "...",
      "area": 0,
      "direction": "...",
      "images": ["..."],
      "contactRealtor": {"name": "...", "phone": "...", "zalo": "...", "email": "..."},
      "source": "https://...",
      "publishedAt": "2024-01-01T00:00:00Z",
      "updatedAt": "2024-01-02T00:00:00Z"
    }
  ]
}

- When no listing matches, "result" is an empty list.
- Unknown values are null or omitted.
- No text before or after the JSON."#;

// ─── Builders ───────────────────────────────────────────────────────────────

/// System prompt for the tool-decision call.
///
/// The question is embedded so the model can copy it verbatim into the
/// search query.
pub fn tool_decision_prompt(history: &[ConversationTurn], question: &str) -> String {
    format!(
        "{ASSISTANT_IDENTITY}\n\n{TOOL_DECISION_RULES}\n\n\
         Previous conversation:\n{}\n\n\
         New user question:\n{question}",
        render_transcript(history)
    )
}

/// System prompt for the answer-synthesis call, output format included.
pub fn synthesis_prompt(history: &[ConversationTurn], context: &str, question: &str) -> String {
    format!(
        "{ASSISTANT_IDENTITY}\n\n{SYNTHESIS_RULES}\n\n\
         ---------------------------------\n\
         CHAT HISTORY: {}\n\
         CONTEXT: {context}\n\
         QUESTION: {question}\n\
         ---------------------------------\n\n\
         {STRUCTURED_OUTPUT_SUFFIX}",
        render_transcript(history)
    )
}

/// User prompt asking for a short summary of older turns.
pub fn summary_prompt(old_turns: &[ConversationTurn]) -> String {
    format!(
        "Summarize this conversation, keeping key information and context (in 2-3 sentences):\n{}",
        render_transcript(old_turns)
    )
}

/// Join tool outputs, in call order, into one context block.
pub fn build_context<S: AsRef<str>>(outputs: &[S]) -> String {
    outputs
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

// ─── Tests ──────────────────────────────────────────────────────────────────
