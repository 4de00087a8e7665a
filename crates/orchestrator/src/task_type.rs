//! Keyword-based refinement of a `COMPLEX_TASK` message into the broker's
//! `TaskType` closed set, ported verbatim from the original
//! `agent/core.py::_classify_task_type` keyword sets.

use corvus_types::TaskType;

const CODE_KEYWORDS: &[&str] = &[
    "code", "script", "function", "class", "debug", "fix", "implement", "python", "javascript",
    "typescript", "java", "rust", "go", "programming", "algorithm", "api", "database", "sql",
];
const CODE_REVIEW_KEYWORDS: &[&str] = &["review", "audit", "check"];
const CODE_DEBUG_KEYWORDS: &[&str] = &["debug", "fix", "error", "bug"];
const MATH_KEYWORDS: &[&str] = &[
    "math", "calculate", "equation", "prove", "theorem", "logic", "reasoning", "analyze", "why",
    "how does", "explain in detail",
];
const MATH_SPECIFIC_KEYWORDS: &[&str] = &["math", "calculate", "equation"];
const CREATIVE_KEYWORDS: &[&str] = &[
    "write", "story", "poem", "creative", "imagine", "fiction", "narrative", "character", "plot",
];
const SUMMARIZATION_KEYWORDS: &[&str] = &["summarize", "summary", "tldr", "condense"];

fn any_keyword(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|kw| text.contains(kw))
}

/// Classifies `message` into a [`TaskType`] for provider selection.
/// Checked in the same order as the original: code first (with
/// review/debug sub-classification), then math/reasoning, then creative,
/// then summarization, defaulting to `Conversation`.
pub fn classify_task_type(message: &str) -> TaskType {
    let lower = message.to_ascii_lowercase();

    if any_keyword(&lower, CODE_KEYWORDS) {
        if any_keyword(&lower, CODE_REVIEW_KEYWORDS) {
            return TaskType::CodeReview;
        }
        if any_keyword(&lower, CODE_DEBUG_KEYWORDS) {
            return TaskType::CodeDebugging;
        }
        return TaskType::CodeGeneration;
    }

    if any_keyword(&lower, MATH_KEYWORDS) {
        if any_keyword(&lower, MATH_SPECIFIC_KEYWORDS) {
            return TaskType::MathAnalysis;
        }
        return TaskType::ComplexReasoning;
    }

    if any_keyword(&lower, CREATIVE_KEYWORDS) {
        return TaskType::CreativeWriting;
    }

    if any_keyword(&lower, SUMMARIZATION_KEYWORDS) {
        return TaskType::Summarization;
    }

    TaskType::Conversation
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_keyword_without_review_or_debug_is_code_generation() {
        assert_eq!(classify_task_type("write a python web scraper"), TaskType::CodeGeneration);
    }

    #[test]
    fn code_review_keyword_wins_over_plain_code_generation() {
        assert_eq!(classify_task_type("review this python function"), TaskType::CodeReview);
    }

    #[test]
    fn debug_keyword_is_code_debugging() {
        assert_eq!(classify_task_type("fix this bug in my rust code"), TaskType::CodeDebugging);
    }

    #[test]
    fn math_specific_keyword_is_math_analysis() {
        assert_eq!(classify_task_type("calculate the area of this shape"), TaskType::MathAnalysis);
    }

    #[test]
    fn reasoning_keyword_without_math_specific_is_complex_reasoning() {
        assert_eq!(classify_task_type("explain in detail why this happens"), TaskType::ComplexReasoning);
    }

    #[test]
    fn creative_keyword_is_creative_writing() {
        assert_eq!(classify_task_type("write me a short story"), TaskType::CreativeWriting);
    }

    #[test]
    fn summarization_keyword_is_summarization() {
        assert_eq!(classify_task_type("can you summarize this article"), TaskType::Summarization);
    }

    #[test]
    fn no_keyword_match_defaults_to_conversation() {
        assert_eq!(classify_task_type("how's your day going"), TaskType::Conversation);
    }
}
