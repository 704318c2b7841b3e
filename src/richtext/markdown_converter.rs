// Markdown Converter
// Converts between DocumentTree and Markdown text format
// Markdown is used purely as a storage/serialization format

use super::document_tree::{BlockType, DocumentTree, NodeId, NodeKind};
use super::format::Format;
use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};
use regex::Regex;
use std::sync::LazyLock;

static INLINE_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^<(/?)([a-z][a-z0-9-]*)>$").expect("inline tag pattern compiles")
});

/// Convert markdown text to a DocumentTree
pub fn markdown_to_tree(markdown: &str) -> DocumentTree {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    let parser = Parser::new_ext(markdown, options);

    let mut builder = TreeBuilder::default();
    for event in parser {
        match event {
            Event::Start(tag) => match tag {
                Tag::Paragraph => builder.open_paragraph(),
                Tag::Heading { level, .. } => builder.open_block(BlockType::heading(level as u8)),
                Tag::BlockQuote(_) => builder.quote_depth += 1,
                Tag::CodeBlock(_) => {
                    builder.open_block(BlockType::CodeBlock);
                    builder.code = Some(String::new());
                }
                Tag::Item => {
                    builder.open_block(BlockType::ListItem);
                    builder.item = builder.block;
                }
                Tag::Emphasis => builder.open_format(Format::italic()),
                Tag::Strong => builder.open_format(Format::bold()),
                Tag::Strikethrough => builder.open_format(Format::strikethrough()),
                _ => {}
            },

            Event::End(tag_end) => match tag_end {
                TagEnd::Paragraph | TagEnd::Heading(_) => builder.close_block(),
                TagEnd::CodeBlock => {
                    if let Some(code) = builder.code.take() {
                        builder.push_text(code.strip_suffix('\n').unwrap_or(&code));
                    }
                    builder.close_block();
                }
                TagEnd::BlockQuote(_) => builder.quote_depth = builder.quote_depth.saturating_sub(1),
                TagEnd::Item => {
                    builder.item = None;
                    builder.close_block();
                }
                TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough => {
                    builder.inline.pop();
                }
                _ => {}
            },

            Event::Text(text) => match builder.code.as_mut() {
                Some(code) => code.push_str(&text),
                None => builder.push_text(&text),
            },

            Event::Code(code) => {
                builder.open_format(Format::code());
                builder.push_text(&code);
                builder.inline.pop();
            }

            Event::InlineHtml(html) => builder.inline_html(&html),

            Event::SoftBreak => builder.push_text(" "),
            Event::HardBreak => builder.push_text("\n"),

            _ => {}
        }
    }

    let mut tree = builder.tree;
    tree.normalize(None);

    // Ensure at least one block exists
    if tree.is_empty() {
        tree.push_block(BlockType::Paragraph);
    }
    tree
}

#[derive(Default)]
struct TreeBuilder {
    tree: DocumentTree,
    block: Option<NodeId>,
    /// Open inline formats, innermost last
    inline: Vec<NodeId>,
    item: Option<NodeId>,
    quote_depth: usize,
    code: Option<String>,
}

impl TreeBuilder {
    fn open_block(&mut self, block_type: BlockType) {
        self.inline.clear();
        self.block = Some(self.tree.push_block(block_type));
    }

    fn open_paragraph(&mut self) {
        // The first paragraph of a loose list item fills the item itself
        if let Some(item) = self.item
            && self.tree.children(item).is_empty()
        {
            self.block = Some(item);
            return;
        }
        if self.item.is_some() {
            self.open_block(BlockType::ListItem);
        } else if self.quote_depth > 0 {
            self.open_block(BlockType::BlockQuote);
        } else {
            self.open_block(BlockType::Paragraph);
        }
    }

    fn close_block(&mut self) {
        self.inline.clear();
        self.block = None;
    }

    fn container(&mut self) -> NodeId {
        if let Some(&format) = self.inline.last() {
            return format;
        }
        match self.block {
            Some(block) => block,
            None => {
                self.open_paragraph();
                self.block.unwrap_or_else(|| self.tree.push_block(BlockType::Paragraph))
            }
        }
    }

    fn open_format(&mut self, format: Format) {
        let parent = self.container();
        let node = self.tree.create_format(format);
        self.tree.append_child(parent, node);
        self.inline.push(node);
    }

    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let parent = self.container();
        let run = self.tree.create_text(text);
        self.tree.append_child(parent, run);
    }

    /// Inline HTML tags such as `<u>` open and close formats; anything else is kept as text
    fn inline_html(&mut self, html: &str) {
        let Some(captures) = INLINE_TAG.captures(html.trim()) else {
            self.push_text(html);
            return;
        };
        let closing = !captures[1].is_empty();
        let Ok(format) = Format::new(&captures[2]) else {
            self.push_text(html);
            return;
        };

        if !closing {
            self.open_format(format);
        } else if let Some(&open) = self.inline.last()
            && self.tree.is_format(open, &format)
        {
            self.inline.pop();
        } else {
            log::debug!("unmatched inline html {}", html);
        }
    }
}

/// Convert a DocumentTree to markdown text
///
/// Text is escaped so that reading the output back with [`markdown_to_tree`]
/// yields the same tree. Formats without a Markdown delimiter, and delimiters
/// CommonMark would not recognize at their position, are written as inline
/// HTML tags instead.
pub fn tree_to_markdown(tree: &DocumentTree) -> String {
    let mut output = String::new();

    for (i, &block) in tree.blocks().iter().enumerate() {
        if i > 0 {
            output.push_str("\n\n");
        }

        match tree.block_type(block) {
            Some(BlockType::Heading { level }) => {
                output.push_str(&"#".repeat(*level as usize));
                output.push(' ');
                output.push_str(&block_inline(tree, block));
            }
            Some(BlockType::CodeBlock) => {
                let code = tree.text_content(block);
                let fence = "`".repeat(longest_run(&code, '`').max(2) + 1);
                output.push_str(&fence);
                output.push('\n');
                output.push_str(&code);
                output.push('\n');
                output.push_str(&fence);
            }
            Some(BlockType::BlockQuote) => {
                output.push_str("> ");
                output.push_str(&block_inline(tree, block));
            }
            Some(BlockType::ListItem) => {
                output.push_str("- ");
                output.push_str(&block_inline(tree, block));
            }
            Some(BlockType::Paragraph) | None => output.push_str(&block_inline(tree, block)),
        }
    }

    output
}

/// A rendered inline child, before delimiters are chosen for formats
enum Piece<'a> {
    Literal(String),
    Format { format: &'a Format, inner: String },
}

impl Piece<'_> {
    /// First character this piece writes; delimiters and tags are all punctuation
    fn first_char(&self) -> Option<char> {
        match self {
            Piece::Literal(text) => text.chars().next(),
            Piece::Format { .. } => Some('<'),
        }
    }
}

/// The inline content of a block, guarded against being read as block syntax
fn block_inline(tree: &DocumentTree, block: NodeId) -> String {
    let inline = inline_to_markdown(tree, block);
    let lines: Vec<&str> = inline.split('\n').collect();
    let last = lines.len() - 1;
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| protect_line(line, i == last))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Escape list and setext markers at the start of a line and keep edge
/// whitespace from being trimmed
fn protect_line(line: &str, last: bool) -> String {
    let body = line.trim_start_matches([' ', '\t']);
    let lead = &line[..line.len() - body.len()];
    let mut output = String::new();
    for c in lead.chars() {
        output.push_str(char_reference(c));
    }

    let digits = body.bytes().take_while(u8::is_ascii_digit).count();
    if lead.is_empty() && body.starts_with(['-', '+', '=']) {
        output.push('\\');
        output.push_str(body);
    } else if lead.is_empty() && digits > 0 && body[digits..].starts_with(['.', ')']) {
        output.push_str(&body[..digits]);
        output.push('\\');
        output.push_str(&body[digits..]);
    } else {
        output.push_str(body);
    }

    if last {
        let trimmed = output.trim_end_matches([' ', '\t']).len();
        let trail: String = output[trimmed..].chars().map(char_reference).collect();
        output.truncate(trimmed);
        output.push_str(&trail);
    }
    output
}

fn char_reference(c: char) -> &'static str {
    match c {
        '\t' => "&#9;",
        _ => "&#32;",
    }
}

/// Convert the inline children of a node to markdown
fn inline_to_markdown(tree: &DocumentTree, node: NodeId) -> String {
    let pieces: Vec<Piece> = tree
        .children(node)
        .iter()
        .filter_map(|&child| piece(tree, child))
        .collect();

    let mut output = String::new();
    for (i, piece) in pieces.iter().enumerate() {
        match piece {
            Piece::Literal(text) => output.push_str(text),
            Piece::Format { format, inner } => {
                let prev = output.chars().last();
                let next = pieces.get(i + 1).and_then(Piece::first_char);
                match delimiter(format).filter(|d| can_delimit(d, inner, prev, next)) {
                    Some(delimiter) => {
                        output.push_str(delimiter);
                        output.push_str(inner);
                        output.push_str(delimiter);
                    }
                    None => {
                        output.push_str(&format!("<{}>{}</{}>", format.tag(), inner, format.tag()));
                    }
                }
            }
        }
    }
    output
}

fn piece(tree: &DocumentTree, node: NodeId) -> Option<Piece<'_>> {
    match tree.kind(node)? {
        NodeKind::Text(text) if text.is_empty() => None,
        NodeKind::Text(text) => Some(Piece::Literal(escape_text(text))),
        // Code spans cannot hold other markup, so nested formats use the tag form
        NodeKind::Format(format)
            if *format == Format::code() && tree.children(node).iter().all(|&c| tree.is_text(c)) =>
        {
            Some(Piece::Literal(code_span(&tree.text_content(node))))
        }
        NodeKind::Format(format) => Some(Piece::Format {
            format,
            inner: inline_to_markdown(tree, node),
        }),
        NodeKind::Marker(_) => Some(Piece::Literal(inline_to_markdown(tree, node))),
        _ => None,
    }
}

fn delimiter(format: &Format) -> Option<&'static str> {
    match format.tag() {
        "strong" => Some("**"),
        "em" => Some("*"),
        "del" => Some("~~"),
        _ => None,
    }
}

fn is_punctuation(c: char) -> bool {
    !c.is_alphanumeric() && !c.is_whitespace()
}

fn is_boundary(c: Option<char>) -> bool {
    c.is_none_or(|c| c.is_whitespace() || is_punctuation(c))
}

/// Whether `delimiter` around `inner` opens and closes as CommonMark emphasis
///
/// `prev` and `next` are the characters around the span; `None` stands for the
/// edge of the enclosing format or block, which is whitespace or punctuation.
/// Delimiter runs are never placed next to the same character, so adjacent
/// runs cannot be regrouped.
fn can_delimit(delimiter: &str, inner: &str, prev: Option<char>, next: Option<char>) -> bool {
    let (Some(mark), Some(first), Some(last)) =
        (delimiter.chars().next(), inner.chars().next(), inner.chars().last())
    else {
        return false;
    };
    let left_flanking = !first.is_whitespace() && (!is_punctuation(first) || is_boundary(prev));
    let right_flanking = !last.is_whitespace() && (!is_punctuation(last) || is_boundary(next));
    left_flanking
        && right_flanking
        && prev != Some(mark)
        && next != Some(mark)
        && first != mark
        && last != mark
}

fn escape_text(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' | '*' | '_' | '`' | '~' | '#' | '[' | ']' | '<' | '>' | '&' | '!' | '|' => {
                output.push('\\');
                output.push(c);
            }
            '\n' => output.push_str("\\\n"),
            c => output.push(c),
        }
    }
    output
}

/// A code span whose fence is longer than any backtick run inside it
fn code_span(code: &str) -> String {
    let fence = "`".repeat(longest_run(code, '`') + 1);
    let padded = code.starts_with('`')
        || code.ends_with('`')
        || (code.starts_with(' ') && code.ends_with(' ') && code.trim() != "");
    let pad = if padded { " " } else { "" };
    format!("{fence}{pad}{code}{pad}{fence}")
}

fn longest_run(text: &str, c: char) -> usize {
    text.split(|x| x != c).map(str::len).max().unwrap_or(0)
}
