//! Text rules applied to manifest scripts.
//!
//! Two pieces live here: picking the primary script out of an archive's
//! entry names, and the line rule that comments out `setManifestid` calls.

use std::sync::OnceLock;

use regex::Regex;

/// Extension of the primary script.
pub const PRIMARY_EXTENSION: &str = "lua";

/// Suffix marking a disabled script.
pub const DISABLED_SUFFIX: &str = ".disabled";

/// Extension of auxiliary depot manifests (matched case-insensitively).
pub const AUXILIARY_EXTENSION: &str = ".manifest";

/// Directive whose invocations are commented out.
pub const DISABLE_DIRECTIVE: &str = "setManifestid";

/// Lua line comment marker.
pub const COMMENT_MARKER: &str = "--";

fn primary_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(&format!(r"^\d+\.{}$", PRIMARY_EXTENSION)).expect("static pattern is valid")
    })
}

/// Final path component of an archive entry name.
///
/// Zip names use `/`, but archives built on Windows sometimes carry `\`.
pub fn base_name(entry_name: &str) -> &str {
    entry_name
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(entry_name)
}

/// Whether an entry name looks like a primary script (`<digits>.lua`).
pub fn is_primary_candidate(entry_name: &str) -> bool {
    primary_name_pattern().is_match(base_name(entry_name))
}

/// Whether an entry name is an auxiliary depot manifest.
pub fn is_auxiliary(entry_name: &str) -> bool {
    entry_name
        .to_ascii_lowercase()
        .ends_with(AUXILIARY_EXTENSION)
}

/// File name of the installed script for an app.
pub fn primary_file_name(app_id: u32) -> String {
    format!("{}.{}", app_id, PRIMARY_EXTENSION)
}

/// File name of the disabled form of an app's script.
pub fn disabled_file_name(app_id: u32) -> String {
    format!("{}{}", primary_file_name(app_id), DISABLED_SUFFIX)
}

/// Choose the primary script among archive entry names.
///
/// An entry whose base name is exactly `<app_id>.lua` wins; otherwise the
/// first candidate in iteration order is taken.
pub fn select_primary<'a, I>(names: I, app_id: u32) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let preferred = primary_file_name(app_id);
    let mut first = None;

    for name in names.into_iter().filter(|n| is_primary_candidate(n)) {
        if base_name(name) == preferred {
            return Some(name);
        }
        first.get_or_insert(name);
    }

    first
}

/// Outcome of applying the line rule to a text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchedText {
    pub text: String,
    pub lines_commented: usize,
}

impl PatchedText {
    /// Whether any line changed.
    pub fn changed(&self) -> bool {
        self.lines_commented > 0
    }
}

/// Comments out lines that invoke a directive.
///
/// A line matches when, after optional leading whitespace, it starts with
/// `<directive>(`. Lines already starting with the marker after whitespace are
/// left alone, which makes the rule idempotent.
#[derive(Debug, Clone)]
pub struct CommentOutRule {
    directive: Regex,
    marker: String,
}

impl Default for CommentOutRule {
    fn default() -> Self {
        Self::new(DISABLE_DIRECTIVE, COMMENT_MARKER)
    }
}

impl CommentOutRule {
    /// Build a rule for `directive`, inserting `marker` in front of it.
    pub fn new(directive: &str, marker: &str) -> Self {
        let directive = Regex::new(&format!(r"^\s*{}\(", regex::escape(directive)))
            .expect("escaped directive is a valid pattern");
        Self {
            directive,
            marker: marker.to_string(),
        }
    }

    /// Whether a single line would be rewritten.
    pub fn matches(&self, line: &str) -> bool {
        self.directive.is_match(line) && !line.trim_start().starts_with(&self.marker)
    }

    /// Apply the rule to every line, preserving line terminators.
    pub fn apply(&self, text: &str) -> PatchedText {
        let mut out = String::with_capacity(text.len() + 16);
        let mut lines_commented = 0;

        for line in split_lines_inclusive(text) {
            if self.matches(line) {
                let indent = line.len() - line.trim_start().len();
                out.push_str(&line[..indent]);
                out.push_str(&self.marker);
                out.push_str(&line[indent..]);
                lines_commented += 1;
            } else {
                out.push_str(line);
            }
        }

        PatchedText {
            text: out,
            lines_commented,
        }
    }
}

/// Split after each `\n`, `\r\n` or lone `\r`, keeping the terminators.
fn split_lines_inclusive(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = text;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        let bytes = rest.as_bytes();
        let end = match bytes.iter().position(|&b| b == b'\n' || b == b'\r') {
            None => rest.len(),
            Some(i) if bytes[i] == b'\r' && bytes.get(i + 1) == Some(&b'\n') => i + 2,
            Some(i) => i + 1,
        };
        let (line, tail) = rest.split_at(end);
        rest = tail;
        Some(line)
    })
}

/// Decode entry bytes as UTF-8, replacing invalid sequences.
pub fn decode_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
