use crate::error::{DocShelfError, Result};
use pulldown_cmark::{html, CodeBlockKind, CowStr, Event, Options, Parser, Tag, TagEnd};
use std::collections::HashMap;
use std::sync::OnceLock;
use syntect::html::{ClassStyle, ClassedHTMLGenerator};
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;

/// Converts a document's raw bytes into the text served to readers.
///
/// Implementations must be pure over their input: the pipeline caches the
/// output by content fingerprint and will not call the renderer again for
/// bytes it has already seen.
pub trait Renderer: Send + Sync {
    fn render(&self, bytes: &[u8]) -> Result<String>;
}

impl<F> Renderer for F
where
    F: Fn(&[u8]) -> Result<String> + Send + Sync,
{
    fn render(&self, bytes: &[u8]) -> Result<String> {
        self(bytes)
    }
}

/// Markdown to HTML with GFM-style extensions, heading anchors, hard line
/// wraps and class-based highlighting of code blocks.
#[derive(Debug, Clone)]
pub struct MarkdownRenderer {
    options: Options,
    hard_wraps: bool,
    highlight: bool,
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownRenderer {
    pub fn new() -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_FOOTNOTES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        options.insert(Options::ENABLE_HEADING_ATTRIBUTES);
        options.insert(Options::ENABLE_MATH);
        MarkdownRenderer {
            options,
            hard_wraps: true,
            highlight: true,
        }
    }

    /// Render single newlines as soft breaks instead of `<br />`.
    pub fn with_soft_wraps(mut self) -> Self {
        self.hard_wraps = false;
        self
    }

    /// Emit code blocks as plain `<pre><code>`.
    pub fn without_highlighting(mut self) -> Self {
        self.highlight = false;
        self
    }

    pub fn render_str(&self, markdown: &str) -> String {
        let markdown = markdown.strip_prefix('\u{feff}').unwrap_or(markdown);
        let mut events = with_heading_ids(Parser::new_ext(markdown, self.options));
        if self.highlight {
            events = highlight_code_blocks(events);
        }

        let mut out = String::with_capacity(markdown.len() * 3 / 2);
        if self.hard_wraps {
            let events = events.into_iter().map(|event| match event {
                Event::SoftBreak => Event::HardBreak,
                other => other,
            });
            html::push_html(&mut out, events);
        } else {
            html::push_html(&mut out, events.into_iter());
        }
        out
    }
}

impl Renderer for MarkdownRenderer {
    fn render(&self, bytes: &[u8]) -> Result<String> {
        let markdown = std::str::from_utf8(bytes)
            .map_err(|e| DocShelfError::Render(format!("document is not valid UTF-8: {e}")))?;
        Ok(self.render_str(markdown))
    }
}

/// Give every heading without an explicit `{#id}` an anchor derived from its
/// text. Repeated anchors get `-1`, `-2`, ... suffixes.
fn with_heading_ids<'a>(parser: Parser<'a>) -> Vec<Event<'a>> {
    let mut events = Vec::new();
    let mut used: HashMap<String, usize> = HashMap::new();
    let mut heading: Option<(usize, String)> = None;

    for event in parser {
        match &event {
            Event::Start(Tag::Heading { .. }) => heading = Some((events.len(), String::new())),
            Event::Text(text) | Event::Code(text) => {
                if let Some((_, buf)) = heading.as_mut() {
                    buf.push_str(text);
                }
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some((start, text)) = heading.take() {
                    if let Some(Event::Start(Tag::Heading { id, .. })) = events.get_mut(start) {
                        if id.is_none() {
                            *id = Some(CowStr::from(unique_anchor(&text, &mut used)));
                        }
                    }
                }
            }
            _ => {}
        }
        events.push(event);
    }

    events
}

fn syntax_set() -> &'static SyntaxSet {
    static SYNTAXES: OnceLock<SyntaxSet> = OnceLock::new();
    SYNTAXES.get_or_init(SyntaxSet::load_defaults_newlines)
}

struct PendingBlock<'a> {
    lang: String,
    code: String,
    events: Vec<Event<'a>>,
}

/// Replace each code block with its highlighted HTML. A block that fails to
/// highlight keeps its original events and renders as plain `<pre><code>`.
fn highlight_code_blocks(events: Vec<Event<'_>>) -> Vec<Event<'_>> {
    let mut out = Vec::with_capacity(events.len());
    let mut pending: Option<PendingBlock> = None;

    for event in events {
        match event {
            Event::Start(Tag::CodeBlock(ref kind)) if pending.is_none() => {
                let lang = match kind {
                    CodeBlockKind::Fenced(info) => {
                        info.split_whitespace().next().unwrap_or_default().to_string()
                    }
                    CodeBlockKind::Indented => String::new(),
                };
                pending = Some(PendingBlock {
                    lang,
                    code: String::new(),
                    events: vec![event],
                });
            }
            Event::End(TagEnd::CodeBlock) if pending.is_some() => {
                if let Some(mut block) = pending.take() {
                    match highlight(&block.lang, &block.code) {
                        Some(html) => out.push(Event::Html(CowStr::from(html))),
                        None => {
                            block.events.push(event);
                            out.extend(block.events);
                        }
                    }
                }
            }
            other => match pending.as_mut() {
                Some(block) => {
                    if let Event::Text(text) = &other {
                        block.code.push_str(text);
                    }
                    block.events.push(other);
                }
                None => out.push(other),
            },
        }
    }

    out
}

/// Highlighted code in a two-column table: line numbers, then the code with
/// one CSS class per scope.
fn highlight(lang: &str, code: &str) -> Option<String> {
    let syntaxes = syntax_set();
    let syntax = if lang.is_empty() {
        None
    } else {
        syntaxes.find_syntax_by_token(lang)
    }
    .unwrap_or_else(|| syntaxes.find_syntax_plain_text());

    let mut generator =
        ClassedHTMLGenerator::new_with_class_style(syntax, syntaxes, ClassStyle::Spaced);
    for line in LinesWithEndings::from(code) {
        if let Err(e) = generator.parse_html_for_line_which_includes_newline(line) {
            log::warn!("Cannot highlight {lang} code block: {e}");
            return None;
        }
    }
    let body = generator.finalize();

    let lines = LinesWithEndings::from(code).count().max(1);
    let mut html = String::with_capacity(body.len() + lines * 4 + 192);
    html.push_str(r#"<div class="highlight"><table class="lntable"><tr><td class="lntd"><pre class="lnt">"#);
    for n in 1..=lines {
        html.push_str(&n.to_string());
        html.push('\n');
    }
    html.push_str(r#"</pre></td><td class="lntd"><pre class="chroma"><code"#);
    let lang: String = lang
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '+' | '#' | '_'))
        .collect();
    if !lang.is_empty() {
        html.push_str(&format!(r#" class="language-{lang}""#));
    }
    html.push('>');
    html.push_str(&body);
    html.push_str("</code></pre></td></tr></table></div>\n");
    Some(html)
}

fn unique_anchor(text: &str, used: &mut HashMap<String, usize>) -> String {
    let mut base = slug::slugify(text);
    if base.is_empty() {
        base = "section".to_string();
    }
    let seen = used.entry(base.clone()).or_insert(0);
    let anchor = if *seen == 0 {
        base
    } else {
        format!("{base}-{seen}")
    };
    *seen += 1;
    anchor
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_renders_basic_markdown() {
        let html = MarkdownRenderer::new().render(b"Some *emphasis* here.").unwrap();
        assert_eq!(html, "<p>Some <em>emphasis</em> here.</p>\n");
    }

    #[test]
    fn test_heading_anchors() {
        let html = MarkdownRenderer::new()
            .render(b"# Getting Started\n\n## Install\n\n## Install\n\n## Custom {#mine}\n")
            .unwrap();
        assert!(html.contains(r#"<h1 id="getting-started">Getting Started</h1>"#));
        assert!(html.contains(r#"<h2 id="install">Install</h2>"#));
        assert!(html.contains(r#"<h2 id="install-1">Install</h2>"#));
        assert!(html.contains(r#"<h2 id="mine">Custom</h2>"#));
    }

    #[test]
    fn test_hard_wraps() {
        let renderer = MarkdownRenderer::new();
        assert_eq!(
            renderer.render_str("one\ntwo"),
            "<p>one<br />\ntwo</p>\n"
        );
        assert_eq!(
            renderer.with_soft_wraps().render_str("one\ntwo"),
            "<p>one\ntwo</p>\n"
        );
    }

    #[test]
    fn test_tables_and_tasklists() {
        let html = MarkdownRenderer::new()
            .render_str("| a | b |\n|---|---|\n| 1 | 2 |\n\n- [x] done\n");
        assert!(html.contains("<table>"));
        assert!(html.contains("checkbox"));
    }

    #[test]
    fn test_code_blocks_are_highlighted_with_classes() {
        let html = MarkdownRenderer::new()
            .render_str("```rust\nfn main() {\n    let x = 1;\n}\n```\n");
        assert!(html.starts_with(r#"<div class="highlight"><table class="lntable">"#));
        assert!(html.contains("<pre class=\"lnt\">1\n2\n3\n</pre>"));
        assert!(html.contains(r#"<code class="language-rust">"#));
        assert!(html.contains("<span class=\""));
        assert!(html.contains("main"));
        assert!(!html.contains("style="));
    }

    #[test]
    fn test_unknown_language_is_escaped_plain_text() {
        let html = MarkdownRenderer::new().render_str("```nosuchlang\n<b> & </b>\n```\n");
        assert!(html.contains("&lt;b&gt; &amp; &lt;/b&gt;"));
        assert!(html.contains(r#"<code class="language-nosuchlang">"#));
        assert!(!html.contains("<b>"));
    }

    #[test]
    fn test_highlighting_can_be_turned_off() {
        let html = MarkdownRenderer::new()
            .without_highlighting()
            .render_str("```rust\nlet x = 1;\n```\n");
        assert_eq!(
            html,
            "<pre><code class=\"language-rust\">let x = 1;\n</code></pre>\n"
        );
    }

    #[test]
    fn test_invalid_utf8_is_a_render_error() {
        let err = MarkdownRenderer::new().render(&[0xff, 0xfe, 0x00]).unwrap_err();
        assert!(matches!(err, DocShelfError::Render(_)));
    }

    #[test]
    fn test_closures_are_renderers() {
        let upper = |bytes: &[u8]| -> Result<String> {
            Ok(String::from_utf8_lossy(bytes).to_uppercase())
        };
        assert_eq!(upper.render(b"abc").unwrap(), "ABC");
    }
}
