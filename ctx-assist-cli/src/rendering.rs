// ctx-assist-cli/src/rendering.rs
//! Terminal rendering for markdown responses.
//!
//! Prose goes through termimad; fenced blocks (where `ctx` output lands) are
//! highlighted with syntect, or written verbatim when styling is off.

use anyhow::{anyhow, Result};
use lazy_static::lazy_static;
use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};
use std::io::{self, Write};
use syntect::{
    easy::HighlightLines,
    highlighting::{Color as SyntectColor, FontStyle, Style, Theme, ThemeSet},
    parsing::SyntaxSet,
    util::LinesWithEndings,
};
use termimad::{
    crossterm::style::{Attribute, Color, ResetColor, SetAttribute, SetForegroundColor},
    MadSkin,
};

use pulldown_cmark_to_cmark::cmark;

const THEME_NAME: &str = "base16-ocean.dark";

lazy_static! {
    static ref SYNTAX_SET: SyntaxSet = SyntaxSet::load_defaults_newlines();
    static ref THEME_SET: ThemeSet = ThemeSet::load_defaults();
}

fn code_theme() -> Option<&'static Theme> {
    THEME_SET.themes.get(THEME_NAME)
}

fn to_crossterm(color: SyntectColor) -> Option<Color> {
    (color.a > 0).then_some(Color::Rgb {
        r: color.r,
        g: color.g,
        b: color.b,
    })
}

fn highlight_code<W: Write>(
    writer: &mut W,
    code: &str,
    language: Option<&str>,
    theme: &Theme,
) -> io::Result<()> {
    // `ctx` output is untagged, so most blocks fall back to plain text.
    let syntax = language
        .filter(|lang| !lang.is_empty())
        .and_then(|lang| SYNTAX_SET.find_syntax_by_token(&lang.to_lowercase()))
        .unwrap_or_else(|| SYNTAX_SET.find_syntax_plain_text());
    let mut highlighter = HighlightLines::new(syntax, theme);

    for line in LinesWithEndings::from(code) {
        let ranges: Vec<(Style, &str)> = highlighter
            .highlight_line(line, &SYNTAX_SET)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        for (style, content) in ranges {
            match to_crossterm(style.foreground) {
                Some(fg) => write!(writer, "{}", SetForegroundColor(fg))?,
                None => write!(writer, "{}", ResetColor)?,
            }
            if style.font_style.contains(FontStyle::BOLD) {
                write!(writer, "{}", SetAttribute(Attribute::Bold))?;
            }
            if style.font_style.contains(FontStyle::ITALIC) {
                write!(writer, "{}", SetAttribute(Attribute::Italic))?;
            }
            write!(writer, "{}{}{}", content, SetAttribute(Attribute::Reset), ResetColor)?;
        }
    }
    write!(writer, "{}", ResetColor)
}

fn create_skin() -> MadSkin {
    let mut skin = MadSkin::default();
    skin.inline_code.set_fg(Color::Cyan);
    skin.inline_code.set_bg(Color::Reset);
    skin
}

/// Turns buffered prose events back into markdown and writes it. Plain mode
/// writes the markdown itself.
fn flush_prose<W: Write>(
    events: &mut Vec<Event<'_>>,
    skin: Option<&MadSkin>,
    writer: &mut W,
) -> Result<()> {
    if events.is_empty() {
        return Ok(());
    }
    let mut markdown = String::new();
    cmark(events.iter(), &mut markdown)
        .map_err(|e| anyhow!("Failed to rebuild markdown: {}", e))?;
    match skin {
        Some(skin) => skin
            .write_text_on(writer, &markdown)
            .map_err(|e| anyhow!("Failed to render markdown: {}", e))?,
        None => writeln!(writer, "{}", markdown)?,
    }
    events.clear();
    Ok(())
}

/// Renders `markdown` to `writer`. With `styled == false` no escape codes
/// are emitted, which keeps piped output and tests readable.
pub fn write_formatted<W: Write>(writer: &mut W, markdown: &str, styled: bool) -> Result<()> {
    let skin = styled.then(create_skin);
    let theme = if styled { code_theme() } else { None };

    let mut prose: Vec<Event<'_>> = Vec::new();
    let mut code = String::new();
    let mut language: Option<String> = None;
    let mut in_code_block = false;

    for event in Parser::new_ext(markdown, Options::ENABLE_TABLES) {
        match &event {
            Event::Start(Tag::CodeBlock(kind)) => {
                flush_prose(&mut prose, skin.as_ref(), writer)?;
                in_code_block = true;
                language = match kind {
                    CodeBlockKind::Fenced(lang) => Some(lang.to_string()),
                    CodeBlockKind::Indented => None,
                };
                code.clear();
            }
            Event::End(TagEnd::CodeBlock) if in_code_block => {
                match theme {
                    Some(theme) => highlight_code(writer, &code, language.as_deref(), theme)?,
                    None => write!(writer, "{}", code)?,
                }
                writeln!(writer)?;
                in_code_block = false;
                language = None;
            }
            Event::Text(text) if in_code_block => code.push_str(text),
            _ if in_code_block => {}
            _ => prose.push(event.clone()),
        }
    }
    flush_prose(&mut prose, skin.as_ref(), writer)?;
    writer.flush()?;
    Ok(())
}

/// Renders to stdout with styling.
pub fn print_formatted(markdown: &str) -> Result<()> {
    let mut stdout = io::stdout().lock();
    write_formatted(&mut stdout, markdown, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render_plain(markdown: &str) -> String {
        let mut out = Vec::new();
        write_formatted(&mut out, markdown, false).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_code_block_is_written_verbatim() {
        let out = render_plain("```\n3 tasks pending\n2 decisions\n```");
        assert_eq!(out, "3 tasks pending\n2 decisions\n\n");
    }

    #[test]
    fn test_prose_around_code_block_keeps_order() {
        let out = render_plain("**Error:** Failed to get status.\n\n```\nboom\n```");
        let error_at = out.find("Failed to get status.").unwrap();
        let code_at = out.find("boom").unwrap();
        assert!(error_at < code_at, "unexpected order: {:?}", out);
    }

    #[test]
    fn test_styled_rendering_emits_code_text() {
        let mut out = Vec::new();
        write_formatted(&mut out, "Intro\n\n```\nline one\n```", true).unwrap();
        let out = String::from_utf8_lossy(&out);
        assert!(out.contains("line one"));
        assert!(out.contains("Intro"));
    }
}
