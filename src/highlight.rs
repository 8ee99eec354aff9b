//! Syntax highlighting of snippet code into standalone HTML documents

use std::sync::LazyLock;
use syntect::easy::HighlightLines;
use syntect::highlighting::{Color, Style, ThemeSet};
use syntect::html::{IncludeBackground, styled_line_to_highlighted_html};
use syntect::parsing::{SyntaxReference, SyntaxSet};
use syntect::util::LinesWithEndings;
use thiserror::Error;

static SYNTAX_SET: LazyLock<SyntaxSet> = LazyLock::new(SyntaxSet::load_defaults_newlines);
static THEME_SET: LazyLock<ThemeSet> = LazyLock::new(ThemeSet::load_defaults);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HighlightError {
    #[error("\"{0}\" is not a valid choice.")]
    UnknownLanguage(String),

    #[error("\"{0}\" is not a valid choice.")]
    UnknownStyle(String),

    #[error("highlighting failed: {0}")]
    Render(String),
}

/// What to render
#[derive(Debug, Clone, Copy)]
pub struct HighlightRequest<'a> {
    pub code: &'a str,
    pub language: &'a str,
    pub style: &'a str,
    pub linenos: bool,
    pub title: &'a str,
}

fn find_syntax(language: &str) -> Option<&'static SyntaxReference> {
    SYNTAX_SET.find_syntax_by_token(language)
}

/// Accepted language names (lowercased syntax names), sorted
pub fn languages() -> Vec<String> {
    let mut names: Vec<String> = SYNTAX_SET
        .syntaxes()
        .iter()
        .map(|syntax| syntax.name.to_lowercase())
        .collect();
    names.sort();
    names.dedup();
    names
}

/// Accepted style (theme) names, sorted
pub fn styles() -> Vec<String> {
    THEME_SET.themes.keys().cloned().collect()
}

pub fn is_known_language(language: &str) -> bool {
    find_syntax(language).is_some()
}

pub fn is_known_style(style: &str) -> bool {
    THEME_SET.themes.contains_key(style)
}

/// Escape text for inclusion in HTML element content or attributes
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn css_color(color: Color) -> String {
    format!("#{:02x}{:02x}{:02x}", color.r, color.g, color.b)
}

/// Render `request.code` as a full HTML document
pub fn render_document(request: &HighlightRequest<'_>) -> Result<String, HighlightError> {
    let syntax = find_syntax(request.language)
        .ok_or_else(|| HighlightError::UnknownLanguage(request.language.to_string()))?;
    let theme = THEME_SET
        .themes
        .get(request.style)
        .ok_or_else(|| HighlightError::UnknownStyle(request.style.to_string()))?;

    let background = theme
        .settings
        .background
        .map(css_color)
        .unwrap_or_else(|| "#ffffff".to_string());
    let gutter = theme
        .settings
        .gutter_foreground
        .map(css_color)
        .unwrap_or_else(|| "#999999".to_string());

    let line_count = LinesWithEndings::from(request.code).count();
    let width = line_count.to_string().len();

    let mut highlighter = HighlightLines::new(syntax, theme);
    let mut body = String::with_capacity(request.code.len() * 4);

    for (index, line) in LinesWithEndings::from(request.code).enumerate() {
        let ranges: Vec<(Style, &str)> = highlighter
            .highlight_line(line, &SYNTAX_SET)
            .map_err(|e| HighlightError::Render(e.to_string()))?;
        let line_html = styled_line_to_highlighted_html(&ranges[..], IncludeBackground::No)
            .map_err(|e| HighlightError::Render(e.to_string()))?;

        if request.linenos {
            body.push_str(&format!(
                "<span class=\"lineno\">{:>width$} </span>",
                index + 1
            ));
        }
        body.push_str(&line_html);
    }

    let title = escape_html(request.title);

    Ok(format!(
        "<!DOCTYPE html>\n\
         <html>\n\
         <head>\n\
         <meta charset=\"utf-8\">\n\
         <title>{title}</title>\n\
         <style>\n\
         body {{ background: {background}; }}\n\
         .lineno {{ color: {gutter}; user-select: none; }}\n\
         </style>\n\
         </head>\n\
         <body>\n\
         <h2>{title}</h2>\n\
         <pre style=\"background-color:{background}\">{body}</pre>\n\
         </body>\n\
         </html>\n"
    ))
}
