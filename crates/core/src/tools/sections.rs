//! # Draft Sections
//!
//! Minimal Markdown structure for drafts: an optional `# Title`, free text
//! before the first section, then `## Heading` sections in order.

/// Heading of the section that carries the research findings verbatim
pub const APPENDIX_HEADING: &str = "Appendix: Research Notes";

/// One `## ` section of a draft
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub heading: String,
    pub body: String,
}

impl Section {
    pub fn new(heading: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            heading: heading.into(),
            body: body.into(),
        }
    }

    pub fn is_appendix(&self) -> bool {
        self.heading.trim() == APPENDIX_HEADING
    }
}

/// A draft split into sections
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    pub title: Option<String>,
    pub preamble: String,
    pub sections: Vec<Section>,
}

impl Draft {
    pub fn parse(text: &str) -> Self {
        let mut draft = Draft::default();
        let mut preamble: Vec<&str> = Vec::new();
        let mut current: Option<(String, Vec<&str>)> = None;

        for line in text.lines() {
            if let Some(heading) = line.strip_prefix("## ") {
                if let Some((heading, body)) = current.take() {
                    draft.sections.push(Section::new(heading, join_trimmed(&body)));
                }
                current = Some((heading.trim().to_string(), Vec::new()));
            } else if let Some((_, body)) = current.as_mut() {
                body.push(line);
            } else if line.starts_with("# ")
                && draft.title.is_none()
                && preamble.iter().all(|l| l.trim().is_empty())
            {
                draft.title = Some(line[2..].trim().to_string());
            } else {
                preamble.push(line);
            }
        }
        if let Some((heading, body)) = current {
            draft.sections.push(Section::new(heading, join_trimmed(&body)));
        }
        draft.preamble = join_trimmed(&preamble);
        draft
    }

    pub fn render(&self) -> String {
        let mut parts = Vec::new();
        if let Some(title) = &self.title {
            parts.push(format!("# {}", title));
        }
        if !self.preamble.is_empty() {
            parts.push(self.preamble.clone());
        }
        for section in &self.sections {
            if section.body.is_empty() {
                parts.push(format!("## {}", section.heading));
            } else {
                parts.push(format!("## {}\n{}", section.heading, section.body));
            }
        }
        let mut out = parts.join("\n\n");
        out.push('\n');
        out
    }

    pub fn headings(&self) -> Vec<&str> {
        self.sections.iter().map(|s| s.heading.as_str()).collect()
    }

    pub fn appendix(&self) -> Option<&Section> {
        self.sections.iter().find(|s| s.is_appendix())
    }

    /// Preamble and every non-appendix section body
    pub fn body_without_appendix(&self) -> String {
        let mut parts = Vec::new();
        if !self.preamble.is_empty() {
            parts.push(self.preamble.as_str());
        }
        parts.extend(
            self.sections
                .iter()
                .filter(|s| !s.is_appendix())
                .map(|s| s.body.as_str()),
        );
        parts.join("\n\n")
    }
}

/// Number of `## ` sections in a text
pub fn section_count(text: &str) -> usize {
    Draft::parse(text).sections.len()
}

fn join_trimmed(lines: &[&str]) -> String {
    let start = lines.iter().position(|l| !l.trim().is_empty());
    let end = lines.iter().rposition(|l| !l.trim().is_empty());
    match (start, end) {
        (Some(start), Some(end)) => lines[start..=end].join("\n"),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "# Paper\n\nLead text.\n\n## Abstract\nShort.\n\n## Methods\n\nStep one.\nStep two.\n\n## Appendix: Research Notes\n- a\n- b\n";

    #[test]
    fn test_parse_sections_in_order() {
        let draft = Draft::parse(SAMPLE);
        assert_eq!(draft.title.as_deref(), Some("Paper"));
        assert_eq!(draft.preamble, "Lead text.");
        assert_eq!(draft.headings(), vec!["Abstract", "Methods", APPENDIX_HEADING]);
        assert_eq!(draft.sections[1].body, "Step one.\nStep two.");
        assert_eq!(draft.appendix().unwrap().body, "- a\n- b");
    }

    #[test]
    fn test_render_round_trips_structure() {
        let draft = Draft::parse(SAMPLE);
        let rendered = draft.render();
        assert_eq!(Draft::parse(&rendered), draft);
        assert!(rendered.contains("## Appendix: Research Notes\n- a\n- b"));
    }

    #[test]
    fn test_body_excludes_appendix() {
        let body = Draft::parse(SAMPLE).body_without_appendix();
        assert!(body.contains("Step one."));
        assert!(!body.contains("- a"));
        assert_eq!(section_count(SAMPLE), 3);
    }

    #[test]
    fn test_text_without_headings_has_no_sections() {
        let draft = Draft::parse("just prose\nmore prose");
        assert!(draft.sections.is_empty());
        assert_eq!(draft.preamble, "just prose\nmore prose");
    }
}
