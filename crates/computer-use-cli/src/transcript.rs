use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use console::style;
use strum::IntoEnumIterator;
use uuid::Uuid;

use computer_use::events::{EventSink, Tone};

/// Console output plus an append-only record of the session, optionally
/// mirrored to an HTML file that is rewritten after every event.
pub struct Transcript {
    session: Uuid,
    entries: Vec<(Tone, String)>,
    html: Option<PathBuf>,
    echo: bool,
}

impl Transcript {
    pub fn new(html: Option<PathBuf>) -> Self {
        Self {
            session: Uuid::new_v4(),
            entries: Vec::new(),
            html,
            echo: true,
        }
    }

    /// A transcript that only records, for tests.
    pub fn quiet(html: Option<PathBuf>) -> Self {
        Self {
            echo: false,
            ..Self::new(html)
        }
    }

    pub fn session(&self) -> Uuid {
        self.session
    }

    pub fn entries(&self) -> &[(Tone, String)] {
        &self.entries
    }

    pub fn render_html(&self) -> String {
        let styles: String = Tone::iter()
            .map(|tone| format!("    .{} {{ color: {}; }}\n", tone, html_color(tone)))
            .collect();
        let body: String = self
            .entries
            .iter()
            .map(|(tone, text)| format!("<pre class=\"{}\">{}</pre>\n", tone, escape_html(text)))
            .collect();

        format!(
            "<!DOCTYPE html>\n<html>\n<head>\n  <meta charset=\"utf-8\">\n  <title>Session {session}</title>\n  <style>\n    body {{ background: #111; font-family: monospace; }}\n    pre {{ margin: 0.2em 0; white-space: pre-wrap; }}\n{styles}  </style>\n</head>\n<body>\n{body}</body>\n</html>\n",
            session = self.session,
            styles = styles,
            body = body,
        )
    }

    fn write_html(&self) -> Result<()> {
        if let Some(path) = &self.html {
            fs::write(path, self.render_html())
                .with_context(|| format!("Failed to write transcript {}", path.display()))?;
        }
        Ok(())
    }
}

impl EventSink for Transcript {
    fn log(&mut self, text: &str, tone: Tone) {
        if self.echo {
            let styled = match tone {
                Tone::Info => style(text).blue(),
                Tone::Success => style(text).green(),
                Tone::Warning => style(text).yellow(),
                Tone::Error => style(text).red(),
                Tone::Detail => style(text).dim(),
            };
            println!("{}", styled);
        }
        self.entries.push((tone, text.to_string()));

        // the session goes on even when the file cannot be written
        if let Err(e) = self.write_html() {
            tracing::warn!(error = %e, "transcript not saved");
        }
    }
}

fn html_color(tone: Tone) -> &'static str {
    match tone {
        Tone::Info => "#58a6ff",
        Tone::Success => "#3fb950",
        Tone::Warning => "#d29922",
        Tone::Error => "#f85149",
        Tone::Detail => "#8b949e",
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_entries_are_appended_in_order() {
        let mut transcript = Transcript::quiet(None);
        transcript.log("click {\"query\":\"OK\"}", Tone::Info);
        transcript.log("Clicked OK at (120, 110)", Tone::Success);

        assert_eq!(
            transcript.entries(),
            &[
                (Tone::Info, "click {\"query\":\"OK\"}".to_string()),
                (Tone::Success, "Clicked OK at (120, 110)".to_string()),
            ]
        );
    }

    #[test]
    fn test_html_file_is_rewritten_after_each_event() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("session.html");
        let mut transcript = Transcript::quiet(Some(path.clone()));

        transcript.log("type_text {\"text\":\"<b>\"}", Tone::Info);
        let first = fs::read_to_string(&path)?;
        assert!(first.contains("<pre class=\"info\">type_text {&quot;text&quot;:&quot;&lt;b&gt;&quot;}</pre>"));
        assert!(first.contains(&transcript.session().to_string()));

        transcript.log("grounding failed", Tone::Error);
        let second = fs::read_to_string(&path)?;
        assert!(second.contains("<pre class=\"error\">grounding failed</pre>"));
        assert!(second.contains(".detail { color: #8b949e; }"));
        Ok(())
    }

    #[test]
    fn test_unwritable_file_does_not_interrupt_logging() {
        let mut transcript = Transcript::quiet(Some(PathBuf::from("/nonexistent/dir/session.html")));
        transcript.log("still recorded", Tone::Warning);
        assert_eq!(transcript.entries().len(), 1);
    }
}
