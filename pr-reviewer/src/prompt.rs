//! Prompt builders for the review and the context query.

use rag_base::ContextSnippet;

const NO_DESCRIPTION: &str = "No description provided.";
const NO_CONTEXT: &str = "No additional context provided.";

/// Query text embedded to look up related code for a pull request.
pub fn build_context_query(title: &str, description: Option<&str>) -> String {
    format!(
        "Review the following pull request titled \"{title}\" with description \"{}\".",
        description.unwrap_or_default()
    )
}

/// Full review prompt. The diff is the source of truth; title and description
/// are the author's stated intent; snippets are optional background.
pub fn build_review_prompt(
    title: &str,
    description: Option<&str>,
    diff: &str,
    context: &[ContextSnippet],
) -> String {
    let description = description
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or(NO_DESCRIPTION);

    let context = if context.is_empty() {
        NO_CONTEXT.to_string()
    } else {
        context
            .iter()
            .map(|s| s.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    let mut s = String::with_capacity(diff.len() + context.len() + 4096);
    s.push_str("You are an expert senior software engineer acting as a professional code reviewer.\n\n");
    s.push_str("Analyze the following pull request and produce a clear, accurate and constructive code review.\n");
    s.push_str("Base your review strictly on the inputs provided. Do NOT guess missing context.\n");

    s.push_str("\n# Pull request inputs\n");
    s.push_str("\nPull Request Title:\n");
    s.push_str(title);
    s.push_str("\n\nPull Request Description:\n");
    s.push_str(description);
    s.push_str("\n\nContext from Codebase (may be empty or partial):\n");
    s.push_str(&context);
    s.push_str("\n\nCode Changes (Unified Diff, source of truth):\n");
    s.push_str(diff);
    s.push('\n');

    s.push_str("\n# Review rules\n");
    s.push_str("- The DIFF is the primary source of truth.\n");
    s.push_str("- The title and description describe intent but may be incomplete or incorrect.\n");
    s.push_str("- Context may help interpret behavior but must not be assumed complete.\n");
    s.push_str("- If intent and implementation do not match, call it out explicitly.\n");
    s.push_str("- Review ONLY files and lines present in the diff.\n");
    s.push_str("- Do NOT invent files, functions, APIs or requirements.\n");
    s.push_str("- If something cannot be determined, say so instead of guessing.\n");

    s.push_str("\n# Required output format (markdown)\n");
    s.push_str("Use exactly these headers, in this order:\n\n");
    s.push_str("## 1. Walkthrough\nFile-by-file explanation of what changed and why it matters.\n\n");
    s.push_str("## 2. Sequence Diagram\nOnly if runtime flow or component interaction changed; a simple valid Mermaid `sequenceDiagram` in a ```mermaid block without quotes, parentheses or braces in labels. Otherwise write \"Not applicable.\"\n\n");
    s.push_str("## 3. Summary\nBrief overview; say whether the approach looks sound, risky or unclear.\n\n");
    s.push_str("## 4. Strengths\nWhat is done well. No generic praise.\n\n");
    s.push_str("## 5. Issues\nBugs, security or data-safety concerns, unhandled edge cases, maintainability risks. Reference the diff. Say so if there are none.\n\n");
    s.push_str("## 6. Suggestions\nConcrete, actionable improvements. Do NOT rewrite the implementation.\n\n");
    s.push_str("## 7. Closing Note\nA short, light-hearted poem (2-4 lines) summarizing the change.\n");

    s.push_str("\n# Tone\nProfessional, constructive and respectful. Assume the author is competent. Prefer clarity over verbosity.\n");
    s
}
