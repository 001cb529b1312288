//! Prompt assembly for retrieval-augmented replies.
//!
//! The retrieved matches are rendered into a fixed text block and appended to
//! the newest user turn, so the model is grounded without calling tools.

use crate::domains::chat::ChatMessage;
use crate::domains::retrieval::RetrievalMatch;
use crate::error::{Result, RmpError};

pub const SYSTEM_PROMPT: &str = "\
You are an intelligent agent designed to help students find the best professors based on \
their specific queries. Your task is to provide the top three professors that match the \
user's query, ranked according to relevance, using the retrieval results attached to the \
user's message. Combine semantic relevance with the existing ratings to decide the best matches.

Understand the query:
Accurately interpret the user's request. If the user is simply interacting with you, such as \
saying hello or asking how you are doing, respond conversationally and do not give any \
professor recommendations.

When the user asks for recommendations, or mentions subjects, teaching styles, course \
difficulty, professor ratings or other relevant attributes, use the retrieval results.

Generate the response:
From the retrieved results, rank the top three professors most relevant to the query. Give a \
brief summary for each one including their name, the subject(s) they teach, their average \
rating and one or two key attributes (teaching style, approachability, grading leniency).

Response format:
Professor 1:
Name: [Professor's Full Name]
Subject(s): [Subjects Taught]
Rating: [Average Rating out of 5]
Attributes: [Brief summary of key attributes]

Professor 2:
Name: [Professor's Full Name]
Subject(s): [Subjects Taught]
Rating: [Average Rating out of 5]
Attributes: [Brief summary of key attributes]

Professor 3:
Name: [Professor's Full Name]
Subject(s): [Subjects Taught]
Rating: [Average Rating out of 5]
Attributes: [Brief summary of key attributes]

Additional guidance:
If no professors match the query exactly, provide the closest alternatives and clearly say so. \
If fewer than three results are relevant, list only those and tell the user. Offer additional \
advice when it helps, such as similar courses or professors.";

pub const RETRIEVAL_HEADER: &str = "\n\nReturned Results from vector db (done automatically):";

/// Renders matches in index order. Missing metadata renders as `unknown`.
pub fn render_retrieval_block(matches: &[RetrievalMatch]) -> String {
    let mut block = String::from(RETRIEVAL_HEADER);
    for hit in matches {
        block.push_str("\n\nProfessor: ");
        block.push_str(&hit.id);
        block.push_str("\nSubject: ");
        block.push_str(hit.subject().as_deref().unwrap_or("unknown"));
        block.push_str("\nStars: ");
        block.push_str(hit.stars().as_deref().unwrap_or("unknown"));
        if let Some(review) = hit.review() {
            block.push_str("\nReview: ");
            block.push_str(&review);
        }
    }
    block
}

pub fn augment_query(query: &str, matches: &[RetrievalMatch]) -> String {
    let mut augmented = String::with_capacity(query.len() + 64 * (matches.len() + 1));
    augmented.push_str(query);
    augmented.push_str(&render_retrieval_block(matches));
    augmented
}

/// System instruction, then every turn but the last unchanged, then the last
/// turn's content with the retrieval block appended as a user message.
pub fn assemble_messages(
    system_prompt: &str,
    conversation: &[ChatMessage],
    matches: &[RetrievalMatch],
) -> Result<Vec<ChatMessage>> {
    let (last, prior) = conversation
        .split_last()
        .ok_or_else(|| RmpError::MalformedInput("conversation is empty".to_string()))?;

    let mut messages = Vec::with_capacity(conversation.len() + 1);
    messages.push(ChatMessage::system(system_prompt));
    messages.extend(prior.iter().cloned());
    messages.push(ChatMessage::user(augment_query(&last.content, matches)));
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::chat::Role;
    use serde_json::{json, Map, Value};

    fn hit(id: &str, metadata: Value) -> RetrievalMatch {
        let metadata: Map<String, Value> = serde_json::from_value(metadata).unwrap();
        RetrievalMatch::new(id, metadata)
    }

    #[test]
    fn renders_each_match_in_order() {
        let block = render_retrieval_block(&[
            hit("Dr. Ada Park", json!({"subject": "Databases", "stars": 5})),
            hit(
                "Dr. Lee",
                json!({"subject": "Compilers", "stars": 3.5, "review": "Tough grader."}),
            ),
        ]);
        assert_eq!(
            block,
            "\n\nReturned Results from vector db (done automatically):\
             \n\nProfessor: Dr. Ada Park\nSubject: Databases\nStars: 5\
             \n\nProfessor: Dr. Lee\nSubject: Compilers\nStars: 3.5\nReview: Tough grader."
        );
    }

    #[test]
    fn zero_matches_still_appends_header() {
        assert_eq!(augment_query("hi", &[]), format!("hi{RETRIEVAL_HEADER}"));
    }

    #[test]
    fn missing_metadata_is_marked_unknown() {
        let block = render_retrieval_block(&[hit("Dr. X", json!({}))]);
        assert!(block.ends_with("Professor: Dr. X\nSubject: unknown\nStars: unknown"));
    }

    #[test]
    fn assembles_system_history_and_augmented_turn() {
        let conversation = vec![
            ChatMessage::assistant("Hi"),
            ChatMessage::user("databases?"),
            ChatMessage::assistant("Which level?"),
            ChatMessage::user("best database professor?"),
        ];
        let matches = vec![hit("Dr. Ada Park", json!({"subject": "Databases", "stars": 5}))];
        let messages = assemble_messages("SYS", &conversation, &matches).unwrap();

        assert_eq!(messages.len(), conversation.len() + 1);
        assert_eq!(messages[0], ChatMessage::system("SYS"));
        assert_eq!(&messages[1..4], &conversation[..3]);
        let last = messages.last().unwrap();
        assert_eq!(last.role, Role::User);
        assert_eq!(
            last.content,
            format!("best database professor?{}", render_retrieval_block(&matches))
        );
    }

    #[test]
    fn single_message_has_no_prior_turns() {
        let messages = assemble_messages("SYS", &[ChatMessage::user("")], &[]).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, RETRIEVAL_HEADER);
    }

    #[test]
    fn empty_conversation_is_malformed() {
        let err = assemble_messages("SYS", &[], &[]).unwrap_err();
        assert!(matches!(err, RmpError::MalformedInput(_)));
    }
}
