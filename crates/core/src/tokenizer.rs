//! Single-pass Lua classifier for editor syntax styling.
//!
//! `classify` returns non-overlapping [`StyleRun`]s in source order, with
//! byte offsets aligned to UTF-8 char boundaries. Whitespace, operators and
//! punctuation are not emitted; the renderer styles those gaps as plain
//! text. Because the scanner walks the text once, a `--` inside a string
//! literal can never open a comment: the string token has already consumed
//! it by the time the scanner looks again.

use std::cell::Cell;
use std::ops::Range;

/// Display categories for Lua source styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenCategory {
    Identifier,
    Number,
    /// Value-ish keywords: `and false local nil not or true`.
    Keyword,
    /// Flow keywords: `if then else end function return` and friends.
    ControlKeyword,
    /// Builtin functions from the base library (`print`, `pairs`, ...).
    Builtin,
    /// Standard library module names (`string`, `math`, ...).
    BuiltinModule,
    String,
    Comment,
}

/// A classified span of source text. Used only for display; never mutates
/// the text it describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleRun {
    pub range: Range<usize>,
    pub category: TokenCategory,
}

impl StyleRun {
    pub fn start(&self) -> usize {
        self.range.start
    }

    pub fn len(&self) -> usize {
        self.range.end - self.range.start
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

/// Classify Lua source into an ordered list of style runs.
///
/// Never fails: malformed or unterminated constructs degrade to whatever
/// span they managed to claim, and everything unclaimed renders as plain
/// text. Same input yields the identical run list.
pub fn classify(source: &str) -> Vec<StyleRun> {
    let mut runs = Vec::new();
    let mut pos = 0;

    while let Some(ch) = char_at(source, pos) {
        if ch.is_ascii_whitespace() {
            pos += ch.len_utf8();
            continue;
        }

        // Comment: two contiguous hyphens, line or long-bracket form
        if source[pos..].starts_with("--") {
            let end = scan_comment(source, pos);
            runs.push(StyleRun { range: pos..end, category: TokenCategory::Comment });
            pos = end;
            continue;
        }

        // Quoted strings
        if ch == '"' || ch == '\'' {
            let end = scan_quoted(source, pos, ch);
            runs.push(StyleRun { range: pos..end, category: TokenCategory::String });
            pos = end;
            continue;
        }

        // Long-bracket strings: [=*[ ... ]=*]
        if ch == '[' {
            if let Some(level) = long_bracket_level(&source[pos..]) {
                let end = scan_long_bracket(source, pos, level);
                runs.push(StyleRun { range: pos..end, category: TokenCategory::String });
                pos = end;
                continue;
            }
        }

        // Numbers, including the leading-dot form `.5`
        if ch.is_ascii_digit()
            || (ch == '.' && matches!(char_at(source, pos + 1), Some(c) if c.is_ascii_digit()))
        {
            let end = scan_number(source, pos);
            runs.push(StyleRun { range: pos..end, category: TokenCategory::Number });
            pos = end;
            continue;
        }

        // Words: identifiers, keywords, builtins
        if ch.is_ascii_alphabetic() || ch == '_' {
            let end = scan_word(source, pos);
            runs.push(StyleRun {
                range: pos..end,
                category: classify_word(&source[pos..end]),
            });
            pos = end;
            continue;
        }

        // Operators, punctuation, stray bytes: consumed, not styled
        pos += ch.len_utf8();
    }

    runs
}

fn char_at(source: &str, pos: usize) -> Option<char> {
    source.get(pos..).and_then(|rest| rest.chars().next())
}

/// Scan a comment starting at the `--`. Long-bracket comments span lines;
/// line comments stop before the newline.
fn scan_comment(source: &str, start: usize) -> usize {
    let body = start + 2;
    if let Some(level) = source.get(body..).and_then(long_bracket_level) {
        return scan_long_bracket(source, body, level);
    }
    match source[body..].find('\n') {
        Some(off) => body + off,
        None => source.len(),
    }
}

/// Scan a quoted string starting at the opening quote. Stops at the first
/// unescaped matching quote; an unterminated string ends at the line break
/// (or end of input) without claiming it.
fn scan_quoted(source: &str, start: usize, quote: char) -> usize {
    let mut iter = source[start + 1..].char_indices();
    while let Some((off, c)) = iter.next() {
        if c == '\\' {
            iter.next();
        } else if c == '\n' {
            return start + 1 + off;
        } else if c == quote {
            return start + 1 + off + c.len_utf8();
        }
    }
    source.len()
}

/// Level of a long-bracket opener at the start of `rest`, if one is there.
/// `[[` is level 0, `[=[` level 1, and so on.
fn long_bracket_level(rest: &str) -> Option<usize> {
    let mut chars = rest.chars();
    if chars.next() != Some('[') {
        return None;
    }
    let mut level = 0;
    loop {
        match chars.next() {
            Some('=') => level += 1,
            Some('[') => return Some(level),
            _ => return None,
        }
    }
}

/// Scan past the matching `]=*]` close for an opener at `open_start`.
/// Unterminated long brackets extend to end of input.
fn scan_long_bracket(source: &str, open_start: usize, level: usize) -> usize {
    let body = open_start + level + 2;
    let close = format!("]{}]", "=".repeat(level));
    match source.get(body..).and_then(|rest| rest.find(&close)) {
        Some(off) => body + off + close.len(),
        None => source.len(),
    }
}

/// Scan a number literal: decimal with optional fraction and exponent, or
/// hex with optional hex fraction and binary exponent. The fraction dot is
/// not consumed when it would swallow a `..` concat operator.
fn scan_number(source: &str, start: usize) -> usize {
    let bytes = source.as_bytes();
    let mut pos = start;

    let is_hex = bytes[pos] == b'0' && matches!(bytes.get(pos + 1), Some(b'x') | Some(b'X'));
    if is_hex {
        pos += 2;
        while matches!(bytes.get(pos), Some(b) if b.is_ascii_hexdigit()) {
            pos += 1;
        }
        if bytes.get(pos) == Some(&b'.')
            && matches!(bytes.get(pos + 1), Some(b) if b.is_ascii_hexdigit())
        {
            pos += 1;
            while matches!(bytes.get(pos), Some(b) if b.is_ascii_hexdigit()) {
                pos += 1;
            }
        }
        if matches!(bytes.get(pos), Some(b'p') | Some(b'P')) {
            pos = scan_exponent(bytes, pos);
        }
        return pos;
    }

    if bytes[pos] == b'.' {
        pos += 1;
    }
    while matches!(bytes.get(pos), Some(b) if b.is_ascii_digit()) {
        pos += 1;
    }
    if bytes.get(pos) == Some(&b'.') && bytes.get(pos + 1) != Some(&b'.') {
        pos += 1;
        while matches!(bytes.get(pos), Some(b) if b.is_ascii_digit()) {
            pos += 1;
        }
    }
    if matches!(bytes.get(pos), Some(b'e') | Some(b'E')) {
        pos = scan_exponent(bytes, pos);
    }
    pos
}

/// Consume an exponent marker, optional sign, and digits.
fn scan_exponent(bytes: &[u8], marker: usize) -> usize {
    let mut pos = marker + 1;
    if matches!(bytes.get(pos), Some(b'+') | Some(b'-')) {
        pos += 1;
    }
    while matches!(bytes.get(pos), Some(b) if b.is_ascii_digit()) {
        pos += 1;
    }
    pos
}

fn scan_word(source: &str, start: usize) -> usize {
    let bytes = source.as_bytes();
    let mut pos = start;
    while matches!(bytes.get(pos), Some(b) if b.is_ascii_alphanumeric() || *b == b'_') {
        pos += 1;
    }
    pos
}

const GENERAL_KEYWORDS: &[&str] = &["and", "false", "local", "nil", "not", "or", "true"];

const CONTROL_KEYWORDS: &[&str] = &[
    "break", "do", "else", "elseif", "end", "for", "function", "goto", "if",
    "in", "repeat", "return", "then", "until", "while",
];

const BUILTIN_FUNCTIONS: &[&str] = &[
    "assert", "collectgarbage", "dofile", "error", "getmetatable", "ipairs",
    "load", "loadfile", "next", "pairs", "pcall", "print", "rawequal",
    "rawget", "rawlen", "rawset", "select", "setmetatable", "tonumber",
    "tostring", "type", "unpack", "xpcall",
];

const BUILTIN_MODULES: &[&str] = &[
    "coroutine", "debug", "io", "math", "os", "package", "string", "table", "utf8",
];

fn classify_word(word: &str) -> TokenCategory {
    if GENERAL_KEYWORDS.contains(&word) {
        TokenCategory::Keyword
    } else if CONTROL_KEYWORDS.contains(&word) {
        TokenCategory::ControlKeyword
    } else if BUILTIN_FUNCTIONS.contains(&word) {
        TokenCategory::Builtin
    } else if BUILTIN_MODULES.contains(&word) {
        TokenCategory::BuiltinModule
    } else {
        TokenCategory::Identifier
    }
}

/// Re-entry suppressor for the host's styling pass.
///
/// Applying style runs to an editable text surface raises the surface's own
/// text-changed notification, which would re-enter classification and loop.
/// The host holds one guard per editor; `enter` yields a token for the
/// duration of one styling application and returns `None` if a token is
/// already live. Dropping the token re-arms the guard.
#[derive(Debug, Default)]
pub struct RestyleGuard {
    applying: Cell<bool>,
}

impl RestyleGuard {
    pub const fn new() -> Self {
        Self { applying: Cell::new(false) }
    }

    /// Begin a styling application. Returns `None` when one is already in
    /// flight, which is the re-entrant notification case.
    pub fn enter(&self) -> Option<RestyleToken<'_>> {
        if self.applying.get() {
            return None;
        }
        self.applying.set(true);
        Some(RestyleToken { guard: self })
    }

    pub fn is_applying(&self) -> bool {
        self.applying.get()
    }
}

/// Live for exactly one styling application.
#[derive(Debug)]
pub struct RestyleToken<'a> {
    guard: &'a RestyleGuard,
}

impl Drop for RestyleToken<'_> {
    fn drop(&mut self) {
        self.guard.applying.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cat(input: &str) -> Vec<(&str, TokenCategory)> {
        classify(input)
            .into_iter()
            .map(|run| (&input[run.range.clone()], run.category))
            .collect()
    }

    #[test]
    fn test_general_vs_control_keywords() {
        let result = cat("local function foo if nil then end or");
        assert_eq!(result, vec![
            ("local", TokenCategory::Keyword),
            ("function", TokenCategory::ControlKeyword),
            ("foo", TokenCategory::Identifier),
            ("if", TokenCategory::ControlKeyword),
            ("nil", TokenCategory::Keyword),
            ("then", TokenCategory::ControlKeyword),
            ("end", TokenCategory::ControlKeyword),
            ("or", TokenCategory::Keyword),
        ]);
    }

    #[test]
    fn test_function_is_control_keyword_not_identifier() {
        let runs = classify("function foo() end");
        assert_eq!(runs[0].category, TokenCategory::ControlKeyword);
        assert_eq!(runs[0].range, 0..8);
    }

    #[test]
    fn test_identifiers() {
        let result = cat("foo bar_baz _x x2");
        assert!(result.iter().all(|(_, c)| *c == TokenCategory::Identifier));
        assert_eq!(result.len(), 4);
    }

    #[test]
    fn test_builtin_functions_and_modules() {
        let result = cat("print(tostring(math.pi))");
        assert_eq!(result, vec![
            ("print", TokenCategory::Builtin),
            ("tostring", TokenCategory::Builtin),
            ("math", TokenCategory::BuiltinModule),
            ("pi", TokenCategory::Identifier),
        ]);
    }

    #[test]
    fn test_numbers() {
        let result = cat("123 3.14 .5 0xFF 0xA.Fp2 1e10 1E-3");
        let expected = ["123", "3.14", ".5", "0xFF", "0xA.Fp2", "1e10", "1E-3"];
        assert_eq!(result.len(), expected.len());
        for ((text, category), want) in result.iter().zip(expected) {
            assert_eq!((*text, *category), (want, TokenCategory::Number));
        }
    }

    #[test]
    fn test_number_before_concat() {
        let result = cat("42..x");
        assert_eq!(result, vec![
            ("42", TokenCategory::Number),
            ("x", TokenCategory::Identifier),
        ]);
    }

    #[test]
    fn test_strings() {
        let result = cat(r#""hello" 'world'"#);
        assert_eq!(result, vec![
            ("\"hello\"", TokenCategory::String),
            ("'world'", TokenCategory::String),
        ]);
    }

    #[test]
    fn test_string_escapes() {
        let result = cat(r#""he\"llo""#);
        assert_eq!(result, vec![(r#""he\"llo""#, TokenCategory::String)]);
    }

    #[test]
    fn test_string_matching_is_non_greedy() {
        let result = cat(r#""a" x "b""#);
        assert_eq!(result, vec![
            ("\"a\"", TokenCategory::String),
            ("x", TokenCategory::Identifier),
            ("\"b\"", TokenCategory::String),
        ]);
    }

    #[test]
    fn test_long_bracket_string() {
        let input = "[==[multi-line\nlong string]==]";
        assert_eq!(cat(input), vec![(input, TokenCategory::String)]);
    }

    #[test]
    fn test_zero_level_long_bracket_string() {
        assert_eq!(cat("[[multi\nline]]"), vec![("[[multi\nline]]", TokenCategory::String)]);
    }

    #[test]
    fn test_indexing_is_not_a_long_bracket() {
        let result = cat("t[i]");
        assert_eq!(result, vec![
            ("t", TokenCategory::Identifier),
            ("i", TokenCategory::Identifier),
        ]);
    }

    #[test]
    fn test_line_comment() {
        let result = cat("x -- a comment\ny");
        assert_eq!(result, vec![
            ("x", TokenCategory::Identifier),
            ("-- a comment", TokenCategory::Comment),
            ("y", TokenCategory::Identifier),
        ]);
    }

    #[test]
    fn test_block_comment_spans_lines() {
        let input = "--[[first\nsecond]] x";
        let result = cat(input);
        assert_eq!(result, vec![
            ("--[[first\nsecond]]", TokenCategory::Comment),
            ("x", TokenCategory::Identifier),
        ]);
    }

    #[test]
    fn test_leveled_block_comment() {
        assert_eq!(
            cat("--[==[block ]] still inside]==]"),
            vec![("--[==[block ]] still inside]==]", TokenCategory::Comment)],
        );
    }

    #[test]
    fn test_comment_marker_inside_string_is_string() {
        // The single most important rule: a comment marker inside a string
        // literal must not open a comment.
        let input = r#"local s = "-- not a comment""#;
        let runs = classify(input);
        assert!(runs.iter().all(|r| r.category != TokenCategory::Comment));
        let string_run = runs.iter().find(|r| r.category == TokenCategory::String).unwrap();
        assert_eq!(&input[string_run.range.clone()], "\"-- not a comment\"");
    }

    #[test]
    fn test_two_minus_operators_are_not_a_comment() {
        let result = cat("a - -b");
        assert_eq!(result, vec![
            ("a", TokenCategory::Identifier),
            ("b", TokenCategory::Identifier),
        ]);
    }

    #[test]
    fn test_unterminated_string_stops_at_line_end() {
        let result = cat("\"open\nx");
        assert_eq!(result, vec![
            ("\"open", TokenCategory::String),
            ("x", TokenCategory::Identifier),
        ]);
    }

    #[test]
    fn test_unterminated_string_at_eof() {
        assert_eq!(cat("\"hello"), vec![("\"hello", TokenCategory::String)]);
    }

    #[test]
    fn test_unterminated_long_bracket() {
        assert_eq!(cat("[==[unterminated"), vec![("[==[unterminated", TokenCategory::String)]);
    }

    #[test]
    fn test_empty_and_whitespace_input() {
        assert!(classify("").is_empty());
        assert!(classify("   \n\t  ").is_empty());
    }

    #[test]
    fn test_idempotent() {
        let input = "local x = 42 -- answer\nprint(\"x\", x)";
        assert_eq!(classify(input), classify(input));
    }

    #[test]
    fn test_runs_in_bounds_and_on_char_boundaries() {
        let input = "local ñ = \"héllo üñî\" -- café\n'l'..0x1F..[[ω]]";
        for run in classify(input) {
            assert!(run.range.end <= input.len(), "run past end: {:?}", run);
            assert!(input.is_char_boundary(run.range.start),
                "start {} not a boundary", run.range.start);
            assert!(input.is_char_boundary(run.range.end),
                "end {} not a boundary", run.range.end);
        }
    }

    #[test]
    fn test_runs_sorted_and_non_overlapping() {
        let input = "local function foo(x, y)\n  return x + y -- sum\nend";
        let runs = classify(input);
        for pair in runs.windows(2) {
            assert!(pair[0].range.end <= pair[1].range.start,
                "overlap: {:?} / {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_stress_generated_script() {
        let mut script = String::new();
        for i in 0..100 {
            script.push_str(&format!(
                "local x_{i} = {i} + 3.14 -- iteration {i}\n\
                 if x_{i} > 0 then\n\
                   print(\"value: \" .. tostring(x_{i}))\n\
                 end\n"
            ));
        }
        let runs = classify(&script);
        assert!(!runs.is_empty());
        for run in &runs {
            assert!(script.is_char_boundary(run.range.start));
            assert!(script.is_char_boundary(run.range.end));
        }
        for pair in runs.windows(2) {
            assert!(pair[0].range.end <= pair[1].range.start);
        }
        assert!(runs.iter().any(|r| r.category == TokenCategory::Comment));
        assert!(runs.iter().any(|r| r.category == TokenCategory::Number));
        assert!(runs.iter().any(|r| r.category == TokenCategory::String));
        assert!(runs.iter().any(|r| r.category == TokenCategory::Builtin));
    }

    #[test]
    fn test_restyle_guard_suppresses_reentry() {
        let guard = RestyleGuard::new();
        let token = guard.enter();
        assert!(token.is_some());
        assert!(guard.is_applying());

        // The notification raised by applying styles lands here
        assert!(guard.enter().is_none());

        drop(token);
        assert!(!guard.is_applying());
        assert!(guard.enter().is_some());
    }
}
