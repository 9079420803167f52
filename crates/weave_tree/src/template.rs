//! Template parser
//!
//! Turns a component's markup into an in-memory [`Node`] tree. The accepted
//! syntax is the HTML subset components actually write:
//!
//! - Elements: `<tag attr="v" attr='v' attr=v flag>children</tag>`
//! - Self-closing elements: `<widget foo="1"/>`
//! - Void elements (`br`, `img`, `input`, ...) which never have children
//! - Text, with `&amp;` `&lt;` `&gt;` `&quot;` `&#39;` and numeric entities decoded
//! - Comments `<!-- ... -->`, which are dropped
//!
//! Tag and attribute names are lower-cased. Whitespace-only text that spans
//! a line break is layout indentation and is discarded; inline whitespace such
//! as the space in `<b>a</b> <i>b</i>` is kept.
//!
//! # Error Handling
//!
//! Malformed markup produces [`WeaveError::Syntax`] with a 1-indexed line and
//! column computed from nom's `VerboseError`. A template whose root is not
//! exactly one element produces [`WeaveError::Structural`].
//!
//! # Interpolation
//!
//! [`interpolate`] substitutes `{state.key}` and `{params.key}` placeholders
//! before parsing. Substituted values are HTML-escaped so they always land as
//! text, never as markup.
//!
//! # Example
//!
//! ```
//! use weave_tree::template::{parse, Node};
//!
//! let root = parse("<div id=\"app\"><h1>Application</h1></div>").unwrap();
//! assert_eq!(root.tag, "div");
//! assert_eq!(root.attribute("id"), Some("app"));
//! assert_eq!(root.children[0].as_element().unwrap().tag, "h1");
//! ```

use nom::{
    branch::alt,
    bytes::complete::{tag, take_until, take_while, take_while1},
    character::complete::{char, multispace0},
    combinator::{cut, opt, value},
    error::{
        context, ContextError, ErrorKind, ParseError as NomParseError, VerboseError,
        VerboseErrorKind,
    },
    multi::many0,
    sequence::{delimited, pair, preceded, terminated},
    Finish, IResult,
};
use tracing::debug;
use weave_core::{Result, StructuralError, WeaveError};

/// Custom parser result type using VerboseError for better diagnostics
type ParseResult<'a, O> = IResult<&'a str, O, VerboseError<&'a str>>;

/// Elements that never have children or a closing tag
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "hr", "img", "input", "link", "meta", "source", "wbr",
];

// =============================================================================
// Node Tree
// =============================================================================

/// A node of a parsed template
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

impl Node {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Node::Text(text) => Some(text),
            Node::Element(_) => None,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Node::Text(_))
    }
}

/// An element with its attributes (in source order) and children
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Element {
    pub tag: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    /// Builder-style attribute
    pub fn attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    /// Builder-style child
    pub fn child(mut self, node: Node) -> Self {
        self.children.push(node);
        self
    }

    /// Look up an attribute value by (lower-case) name
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Concatenated text of all descendant text nodes
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }
}

fn collect_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => collect_text(&el.children, out),
        }
    }
}

// =============================================================================
// Public API
// =============================================================================

/// Parse a component template into its single root element.
///
/// The template is trimmed first. Fails with [`StructuralError::Empty`] when
/// nothing remains, [`StructuralError::MultipleRoots`] when more than one
/// top-level node is present and [`StructuralError::TextRoot`] when the only
/// node is text.
pub fn parse(template: &str) -> Result<Element> {
    let mut nodes = parse_fragment(template.trim())?;

    match nodes.len() {
        0 => Err(StructuralError::Empty.into()),
        1 => match nodes.remove(0) {
            Node::Element(root) => Ok(root),
            Node::Text(_) => Err(StructuralError::TextRoot.into()),
        },
        count => Err(StructuralError::MultipleRoots { count }.into()),
    }
}

/// Parse markup into any number of top-level nodes
pub fn parse_fragment(markup: &str) -> Result<Vec<Node>> {
    match node_list(markup).finish() {
        Ok((remaining, nodes)) => {
            if remaining.is_empty() {
                return Ok(nodes);
            }
            let (line, column, fragment) = calculate_position(markup, remaining);
            debug!(line, column, near = %fragment, "unparsed template content");
            Err(WeaveError::Syntax {
                line,
                column,
                message: format!("unexpected input near \"{}\"", fragment),
            })
        }
        Err(err) => {
            let (line, column) = match err.errors.first() {
                Some((frag, _)) => {
                    let (line, column, _) = calculate_position(markup, frag);
                    (line, column)
                }
                None => (1, 1),
            };
            let message = format_verbose_error(&err);
            debug!(line, column, message = %message, "template parse error");
            Err(WeaveError::Syntax {
                line,
                column,
                message,
            })
        }
    }
}

/// Which map a placeholder reads from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaceholderScope {
    State,
    Params,
}

/// Substitute `{state.key}` / `{params.key}` placeholders.
///
/// `resolve` returns the rendered value, or `None` for an unknown key, which
/// renders as the empty string. Braces that do not form a placeholder are
/// copied through unchanged.
pub fn interpolate<F>(template: &str, mut resolve: F) -> String
where
    F: FnMut(PlaceholderScope, &str) -> Option<String>,
{
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find('{') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];

        match placeholder(rest) {
            Ok((after, (scope, key))) => {
                match resolve(scope, key) {
                    Some(value) => out.push_str(&escape_html(&value)),
                    None => debug!(?scope, key, "unknown template placeholder"),
                }
                rest = after;
            }
            Err(_) => {
                out.push('{');
                rest = &rest[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

/// Escape the five markup-significant characters
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Decode the entities [`escape_html`] produces, plus numeric references
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];

        let decoded = rest.find(';').and_then(|end| {
            let decoded = match &rest[1..end] {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                entity => numeric_entity(entity),
            };
            decoded.map(|c| (c, end))
        });

        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn numeric_entity(entity: &str) -> Option<char> {
    let digits = entity.strip_prefix('#')?;
    let code = match digits.strip_prefix('x').or_else(|| digits.strip_prefix('X')) {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => digits.parse().ok()?,
    };
    char::from_u32(code)
}

// =============================================================================
// Parsers
// =============================================================================

/// Parse sibling nodes until a closing tag or end of input
fn node_list(input: &str) -> ParseResult<Vec<Node>> {
    let (input, nodes) = many0(node)(input)?;
    Ok((input, nodes.into_iter().flatten().collect()))
}

/// One node; comments and indentation yield `None`
fn node(input: &str) -> ParseResult<Option<Node>> {
    alt((
        value(None, comment),
        |i| element(i).map(|(i, el)| (i, Some(Node::Element(el)))),
        |i| {
            text(i).map(|(i, raw)| {
                let node = (!is_indentation(raw)).then(|| Node::Text(decode_entities(raw)));
                (i, node)
            })
        },
    ))(input)
}

/// Whitespace-only text containing a line break
fn is_indentation(raw: &str) -> bool {
    raw.trim().is_empty() && raw.contains('\n')
}

/// Parse a comment `<!-- ... -->`
fn comment(input: &str) -> ParseResult<&str> {
    context(
        "comment",
        preceded(tag("<!--"), cut(terminated(take_until("-->"), tag("-->")))),
    )(input)
}

/// Raw text up to the next tag.
///
/// A `<` that cannot start a tag (`a < b`) is kept as text.
fn text(input: &str) -> ParseResult<&str> {
    let mut end = 0;
    let mut chars = input.char_indices().peekable();
    while let Some((idx, c)) = chars.next() {
        if c == '<' {
            let starts_tag = chars
                .peek()
                .is_some_and(|(_, next)| {
                    next.is_ascii_alphabetic() || *next == '/' || *next == '!'
                });
            if starts_tag {
                break;
            }
        }
        end = idx + c.len_utf8();
    }

    if end == 0 {
        return Err(nom::Err::Error(VerboseError::from_error_kind(
            input,
            ErrorKind::TakeWhile1,
        )));
    }
    Ok((&input[end..], &input[..end]))
}

/// Parse an element and, unless it is void or self-closing, its children
fn element(input: &str) -> ParseResult<Element> {
    let (input, _) = char('<')(input)?;
    let (input, name) = tag_name(input)?;

    context(
        "element",
        cut(move |input| {
            let (input, attributes) = many0(preceded(multispace0, attribute))(input)?;
            let (input, _) = multispace0(input)?;
            let (input, self_closing) =
                alt((value(true, tag("/>")), value(false, tag(">"))))(input)?;

            let mut element = Element {
                tag: name.to_ascii_lowercase(),
                attributes: Vec::new(),
                children: Vec::new(),
            };
            for (key, value) in attributes {
                // First occurrence wins, as in HTML
                if element.attribute(&key).is_none() {
                    element.attributes.push((key, value));
                }
            }

            if self_closing || VOID_ELEMENTS.contains(&element.tag.as_str()) {
                return Ok((input, element));
            }

            let (input, children) = node_list(input)?;
            let (input, _) = closing_tag(input, &element.tag)?;
            element.children = children;
            Ok((input, element))
        }),
    )(input)
}

/// Parse `</name>`, requiring it to match the open tag
fn closing_tag<'a>(input: &'a str, expected: &str) -> ParseResult<'a, ()> {
    let start = input;
    let (input, name) = context(
        "closing tag",
        delimited(tag("</"), tag_name, pair(multispace0, char('>'))),
    )(input)?;
    if !name.eq_ignore_ascii_case(expected) {
        let err = VerboseError::from_error_kind(start, ErrorKind::Tag);
        return Err(nom::Err::Failure(VerboseError::add_context(
            start,
            "matching closing tag",
            err,
        )));
    }
    Ok((input, ()))
}

/// Tag names start with a letter
fn tag_name(input: &str) -> ParseResult<&str> {
    let (rest, _) = nom::character::complete::satisfy(|c| c.is_ascii_alphabetic())(input)?;
    let (rest, tail) = take_while(|c: char| {
        c.is_alphanumeric() || matches!(c, '-' | '_' | ':' | '.')
    })(rest)?;
    let len = 1 + tail.len();
    Ok((rest, &input[..len]))
}

/// Parse `name`, `name=value`, `name="value"` or `name='value'`
fn attribute(input: &str) -> ParseResult<(String, String)> {
    let (input, name) = take_while1(|c: char| {
        !c.is_whitespace() && !matches!(c, '/' | '>' | '=' | '"' | '\'' | '<')
    })(input)?;
    let (input, value) = opt(preceded(
        delimited(multispace0, char('='), multispace0),
        context("attribute value", cut(attribute_value)),
    ))(input)?;

    Ok((
        input,
        (
            name.to_ascii_lowercase(),
            value.map(decode_entities).unwrap_or_default(),
        ),
    ))
}

fn attribute_value(input: &str) -> ParseResult<&str> {
    alt((
        delimited(char('"'), take_while(|c| c != '"'), char('"')),
        delimited(char('\''), take_while(|c| c != '\''), char('\'')),
        take_while1(|c: char| !c.is_whitespace() && !matches!(c, '>' | '"' | '\'' | '`' | '<')),
    ))(input)
}

/// Parse `{state.key}` or `{params.key}`
fn placeholder(input: &str) -> ParseResult<(PlaceholderScope, &str)> {
    delimited(
        pair(char('{'), multispace0),
        pair(
            alt((
                value(PlaceholderScope::State, tag("state.")),
                value(PlaceholderScope::Params, tag("params.")),
            )),
            take_while1(|c: char| c.is_alphanumeric() || c == '_' || c == '-'),
        ),
        pair(multispace0, char('}')),
    )(input)
}

// =============================================================================
// Diagnostics
// =============================================================================

/// Calculate line and column of `fragment` inside `original`
fn calculate_position(original: &str, fragment: &str) -> (usize, usize, String) {
    let offset = original.len().saturating_sub(fragment.len());
    let consumed = &original[..offset];

    let line = consumed.matches('\n').count() + 1;
    let column = consumed
        .rfind('\n')
        .map(|pos| offset - pos)
        .unwrap_or(offset + 1);

    let preview: String = fragment.chars().take(30).collect();
    (line, column, preview)
}

/// Format a VerboseError into a human-readable message
fn format_verbose_error(err: &VerboseError<&str>) -> String {
    let mut parts = Vec::new();

    for (input, kind) in &err.errors {
        match kind {
            VerboseErrorKind::Context(ctx) => {
                parts.push(format!("in {}", ctx));
            }
            VerboseErrorKind::Char(c) => {
                let preview: String = input.chars().take(20).collect();
                parts.push(format!("expected '{}' near \"{}\"", c, preview));
            }
            VerboseErrorKind::Nom(ek) => {
                parts.push(format!("{:?}", ek));
            }
        }
    }

    if parts.is_empty() {
        "unknown parse error".to_string()
    } else {
        parts.join(", ")
    }
}
