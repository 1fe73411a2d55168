//! Chat-context injection of an engagement summary.

const CONTEXT_HEADER: &str = "\n\nEngagement history (summary):\n";

/// Text to append to an assistant's system context, or `""` when there is
/// nothing worth adding.
pub fn build_context_from_engagements(context_summary: &str) -> String {
    let summary = context_summary.trim();
    if summary.is_empty() {
        return String::new();
    }
    format!("{}{}", CONTEXT_HEADER, summary)
}
