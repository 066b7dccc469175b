//! Rendering the playbook into prompt context

use super::{Bullet, Playbook};

/// Optional narrowing applied when rendering
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderFilter {
    /// Only these sections, if set
    pub sections: Option<Vec<String>>,
    /// Hide bullets whose harmful count exceeds their helpful count
    pub skip_harmful: bool,
    /// Cap on bullets shown per section
    pub max_per_section: Option<usize>,
}

impl RenderFilter {
    pub fn sections<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sections = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn skip_harmful(mut self) -> Self {
        self.skip_harmful = true;
        self
    }

    pub fn limit(mut self, max_per_section: usize) -> Self {
        self.max_per_section = Some(max_per_section);
        self
    }

    fn includes_section(&self, name: &str) -> bool {
        self.sections
            .as_ref()
            .map(|names| names.iter().any(|n| n == name))
            .unwrap_or(true)
    }

    fn includes_bullet(&self, bullet: &Bullet) -> bool {
        !(self.skip_harmful && bullet.net_score() < 0)
    }
}

/// `[id] content (helpful: h, harmful: n)`
pub fn format_bullet_line(bullet: &Bullet) -> String {
    format!(
        "[{}] {} (helpful: {}, harmful: {})",
        bullet.id(),
        bullet.content(),
        bullet.helpful(),
        bullet.harmful()
    )
}

impl Playbook {
    /// Render bullets grouped under `## section` headers.
    ///
    /// Returns an empty string when nothing survives the filter, so callers
    /// can concatenate the result unconditionally.
    pub fn render(&self, filter: Option<&RenderFilter>) -> String {
        let default_filter = RenderFilter::default();
        let filter = filter.unwrap_or(&default_filter);

        let mut blocks = Vec::new();
        for section in self.sections() {
            if !filter.includes_section(section.name()) {
                continue;
            }
            let limit = filter.max_per_section.unwrap_or(usize::MAX);
            let lines: Vec<String> = section
                .bullets()
                .iter()
                .filter(|b| filter.includes_bullet(b))
                .take(limit)
                .map(format_bullet_line)
                .collect();
            if lines.is_empty() {
                continue;
            }
            blocks.push(format!("## {}\n{}", section.name(), lines.join("\n")));
        }

        blocks.join("\n\n")
    }
}

/// Wrap the rendered playbook with usage guidance for an agent that knows
/// nothing about playbooks. Empty when the playbook has no bullets.
pub fn wrap_for_external_agent(playbook: &Playbook) -> String {
    let rendered = playbook.render(None);
    if rendered.is_empty() {
        return String::new();
    }

    let mut out = String::with_capacity(rendered.len() + 512);
    out.push_str("## Learned Strategies\n\n");
    out.push_str("These strategies were learned from earlier task runs. ");
    out.push_str("Each one shows how often it helped or hurt.\n\n");
    out.push_str(&rendered);
    out.push_str("\n\nHow to use them:\n");
    out.push_str("- Prefer strategies with a high helpful count\n");
    out.push_str("- Avoid strategies whose harmful count is higher than their helpful count\n");
    out.push_str("- Cite a strategy by its id in brackets, e.g. [section-00001], when you rely on it\n");
    out.push_str("- Treat them as patterns, not rigid rules\n");
    out
}
