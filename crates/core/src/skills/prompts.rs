//! Default prompt templates for the stage agents.
//!
//! Every template starts with a `Title:` line so the offline generator can
//! keep its placeholder on topic. Placeholders are `{name}`.

/// Researcher - collects findings for a title
pub const RESEARCHER: &str = "Title: {title}

You are a research assistant preparing notes for an academic paper with the title above.
List at most {max_findings} concise findings that matter for this paper: the problem, the
main prior approaches, open questions, typical methods and how results are evaluated.
Answer with one Markdown bullet per finding (`- ` prefix), no headings and no preamble.";

/// Writer - turns findings into an IMRaD draft
pub const WRITER: &str = "Title: {title}

Write an academic paper draft in IMRaD form for the title above. Use Markdown `## `
headings for Abstract, Introduction, Methods, Results, Discussion, Conclusion and
References, in that order. Do not repeat the title. Ground the text in these research
notes, paraphrasing rather than copying them:

{research}";

/// Editor - polishes one section without changing its structure
pub const EDITOR: &str = "Title: {title}

Copy-edit the \"{heading}\" section of the paper titled above. Fix grammar, clarity and
flow, keep the meaning and the approximate length, and keep any list items as list items.
Return only the revised section body: no headings, no commentary.

{body}";

/// All default prompts with their slugs
pub fn all_defaults() -> Vec<(&'static str, &'static str)> {
    vec![("researcher", RESEARCHER), ("writer", WRITER), ("editor", EDITOR)]
}

/// Substitute `{name}` placeholders
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (name, value)| {
        acc.replace(&format!("{{{}}}", name), value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_prompts_start_with_title() {
        for (slug, content) in all_defaults() {
            assert!(
                content.starts_with("Title: {title}"),
                "Prompt '{}' should lead with the title line",
                slug
            );
            assert!(content.len() > 50, "Prompt '{}' seems too short", slug);
        }
    }

    #[test]
    fn test_render_fills_placeholders() {
        let prompt = render(RESEARCHER, &[("title", "Soil Carbon"), ("max_findings", "5")]);
        assert!(prompt.starts_with("Title: Soil Carbon\n"));
        assert!(prompt.contains("at most 5 concise findings"));
        assert!(!prompt.contains('{'));
    }
}
