// Formats
// Inline format identifiers and the registry that maps host keys onto them

use super::error::{EditError, EditResult};
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

static TAG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9]*(-[a-z0-9]+)*$").expect("tag pattern compiles"));

/// Tags that name blocks or markers and can never be used as a format
const RESERVED_TAGS: &[&str] = &[
    "p",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "blockquote",
    "li",
    "pre",
];

/// An inline format, identified by the tag of the node type that carries it
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Format(String);

impl Format {
    /// Create a format from a tag name, rejecting malformed and reserved tags
    pub fn new(tag: impl Into<String>) -> EditResult<Self> {
        let tag = tag.into();
        if !TAG_PATTERN.is_match(&tag) || RESERVED_TAGS.contains(&tag.as_str()) || tag.starts_with("ctx-")
        {
            return Err(EditError::InvalidFormat(tag));
        }
        Ok(Format(tag))
    }

    fn builtin(tag: &str) -> Self {
        Format(tag.to_string())
    }

    pub fn bold() -> Self {
        Self::builtin("strong")
    }

    pub fn italic() -> Self {
        Self::builtin("em")
    }

    pub fn underline() -> Self {
        Self::builtin("u")
    }

    pub fn strikethrough() -> Self {
        Self::builtin("del")
    }

    pub fn code() -> Self {
        Self::builtin("code")
    }

    pub fn highlight() -> Self {
        Self::builtin("mark")
    }

    pub fn tag(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Maps the opaque keys a host uses ("bold", "italic", ...) to formats
#[derive(Debug, Clone, PartialEq)]
pub struct FormatRegistry {
    formats: BTreeMap<String, Format>,
}

impl FormatRegistry {
    /// A registry with no keys at all
    pub fn empty() -> Self {
        FormatRegistry {
            formats: BTreeMap::new(),
        }
    }

    /// The default registry extended (or overridden) by `key = tag` entries
    pub fn with_overrides<'a>(
        entries: impl IntoIterator<Item = (&'a String, &'a String)>,
    ) -> EditResult<Self> {
        let mut registry = Self::default();
        for (key, tag) in entries {
            registry.register(key.clone(), Format::new(tag.clone())?);
        }
        Ok(registry)
    }

    pub fn register(&mut self, key: impl Into<String>, format: Format) {
        self.formats.insert(key.into(), format);
    }

    /// Look up the format registered for `key`
    pub fn resolve(&self, key: &str) -> EditResult<&Format> {
        self.formats
            .get(key)
            .ok_or_else(|| EditError::UnknownFormat(key.to_string()))
    }

    /// Find the key a format is registered under
    pub fn key_of(&self, format: &Format) -> Option<&str> {
        self.formats
            .iter()
            .find(|(_, f)| *f == format)
            .map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Format)> {
        self.formats.iter().map(|(k, f)| (k.as_str(), f))
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("bold", Format::bold());
        registry.register("italic", Format::italic());
        registry.register("underline", Format::underline());
        registry.register("strikethrough", Format::strikethrough());
        registry.register("code", Format::code());
        registry.register("highlight", Format::highlight());
        registry
    }
}
