//! Rule-based fallback responder.
//!
//! When the conversation engine is not configured the server still answers
//! every successfully transcribed utterance, using an ordered substring
//! match over the lower-cased transcription. First matching rule wins.
//! No state, no failure mode.

/// Ordered rule table: if the lower-cased query contains any listed
/// substring, answer with the paired reply.
const RULES: &[(&[&str], &str)] = &[
    (&["hello", "hi"], "Hello! How can I help you today?"),
    (&["how are you"], "I'm doing well, thank you for asking!"),
    (&["thank"], "You're very welcome!"),
    (&["goodbye", "bye"], "Goodbye! Talk to you soon."),
];

/// Reply when no rule matches.
const DEFAULT_REPLY: &str =
    "I'm sorry, I can't access my advanced functions right now. Please try again later.";

/// Compute a fallback reply for a transcribed utterance.
pub fn respond(query: &str) -> &'static str {
    let query = query.to_lowercase();
    for (needles, reply) in RULES {
        if needles.iter().any(|needle| query.contains(needle)) {
            return reply;
        }
    }
    DEFAULT_REPLY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greeting_rule() {
        assert_eq!(respond("hello there"), "Hello! How can I help you today?");
        assert_eq!(respond("well hi"), "Hello! How can I help you today?");
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        assert_eq!(respond("HELLO"), "Hello! How can I help you today?");
        assert_eq!(
            respond("How Are You today"),
            "I'm doing well, thank you for asking!"
        );
    }

    #[test]
    fn test_first_match_wins() {
        // Contains both a greeting and "how are you"; the greeting rule is
        // listed first.
        assert_eq!(
            respond("hi, how are you"),
            "Hello! How can I help you today?"
        );
    }

    #[test]
    fn test_unmatched_query_gets_apology() {
        assert_eq!(respond("what's the weather on mars"), DEFAULT_REPLY);
    }

    #[test]
    fn test_empty_query_gets_apology() {
        assert_eq!(respond(""), DEFAULT_REPLY);
    }
}
