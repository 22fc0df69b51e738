//! Destination templates (`{username}/{id}-{filename}`)

use crate::error::{Error, Result};
use crate::types::MediaDescriptor;
use crate::utils::sanitize_component;
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

const TEMPLATE_KEY: &str = "filename_template";

#[allow(clippy::expect_used)]
static TOKEN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^{}]*)\}").expect("TOKEN_PATTERN is a valid regex"));

/// A descriptor field that can be substituted into a template
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Token {
    /// `{id}`: id of the original post
    Id,
    /// `{username}`: handle of the original author
    Username,
    /// `{filename}`: last URL path segment, extension included
    Filename,
    /// `{extension}`: extension without the dot
    Extension,
    /// `{url}`: full source URL
    Url,
}

impl Token {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "id" => Some(Token::Id),
            "username" => Some(Token::Username),
            "filename" => Some(Token::Filename),
            "extension" => Some(Token::Extension),
            "url" => Some(Token::Url),
            _ => None,
        }
    }

    fn value(self, descriptor: &MediaDescriptor) -> String {
        match self {
            Token::Id => descriptor.id.to_string(),
            Token::Username => descriptor.username.clone(),
            Token::Filename => descriptor.filename.clone(),
            Token::Extension => descriptor.extension.clone(),
            Token::Url => descriptor.url.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Token(Token),
}

/// Parsed destination template
///
/// Parsing fails on unknown tokens, unbalanced braces, absolute paths and
/// `..` components, so a bad template is reported before any transfer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DestinationTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl DestinationTemplate {
    /// Parse a template string
    pub fn parse(template: &str) -> Result<Self> {
        if template.trim().is_empty() {
            return Err(Error::config(TEMPLATE_KEY, "template is empty"));
        }

        let path = Path::new(template);
        if path.is_absolute() || template.starts_with(['/', '\\']) {
            return Err(Error::config(
                TEMPLATE_KEY,
                format!("template '{template}' must be relative to the output directory"),
            ));
        }
        if path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(Error::config(
                TEMPLATE_KEY,
                format!("template '{template}' must not contain '..'"),
            ));
        }

        let mut segments = Vec::new();
        let mut last = 0;
        for captures in TOKEN_PATTERN.captures_iter(template) {
            let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            push_literal(&mut segments, &template[last..whole.start()], template)?;

            let token = Token::from_name(name.as_str()).ok_or_else(|| {
                Error::config(
                    TEMPLATE_KEY,
                    format!(
                        "unknown token '{{{}}}' (known: {{id}}, {{username}}, {{filename}}, {{extension}}, {{url}})",
                        name.as_str()
                    ),
                )
            })?;
            segments.push(Segment::Token(token));
            last = whole.end();
        }
        push_literal(&mut segments, &template[last..], template)?;

        if !segments.iter().any(|s| matches!(s, Segment::Token(_))) {
            tracing::warn!(template, "Template has no tokens; every media item maps to the same file");
        }

        Ok(Self {
            source: template.to_string(),
            segments,
        })
    }

    /// The template as written
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Render the relative destination for `descriptor`
    ///
    /// Token values can never introduce directories: separators inside
    /// values are replaced and every resulting component is sanitised.
    /// Empty components from a literal `//` are dropped, but a component
    /// holding a token is kept even when the token renders empty, so the
    /// path keeps the shape of the template.
    pub fn render(&self, descriptor: &MediaDescriptor) -> PathBuf {
        // (text, holds a token)
        let mut components = vec![(String::new(), false)];
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => {
                    let mut parts = text.split('/');
                    if let (Some(first), Some(current)) = (parts.next(), components.last_mut()) {
                        current.0.push_str(first);
                    }
                    components.extend(parts.map(|part| (part.to_string(), false)));
                }
                Segment::Token(token) => {
                    if let Some(current) = components.last_mut() {
                        current.0.push_str(&token.value(descriptor).replace(['/', '\\'], "_"));
                        current.1 = true;
                    }
                }
            }
        }

        components
            .into_iter()
            .filter(|(text, has_token)| *has_token || !text.is_empty())
            .map(|(text, _)| sanitize_component(&text))
            .collect()
    }
}

fn push_literal(segments: &mut Vec<Segment>, text: &str, template: &str) -> Result<()> {
    if text.contains(['{', '}']) {
        return Err(Error::config(
            TEMPLATE_KEY,
            format!("unbalanced brace in template '{template}'"),
        ));
    }
    if !text.is_empty() {
        segments.push(Segment::Literal(text.to_string()));
    }
    Ok(())
}

impl std::str::FromStr for DestinationTemplate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
