//! Post-generation check on the agent's final answer.

/// Substrings that mark an answer as a failed lookup.
const FAILURE_MARKERS: [&str; 2] = ["not found", "error"];

/// Hint sent back to the model when an answer is rejected.
pub const RETRY_HINT: &str = "Try finding resource in all namespaces";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The answer stands, unchanged.
    Accept(String),
    /// Ask the model to try again with `hint` appended to the conversation.
    Retry { hint: String },
}

/// Case-sensitive substring match against [`FAILURE_MARKERS`].
pub fn check_output(output: String) -> Verdict {
    if FAILURE_MARKERS.iter().any(|m| output.contains(m)) {
        Verdict::Retry {
            hint: RETRY_HINT.to_string(),
        }
    } else {
        Verdict::Accept(output)
    }
}
