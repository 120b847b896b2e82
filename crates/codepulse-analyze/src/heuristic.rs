//! Built-in line-oriented analyzer.
//!
//! Finds function declarations with per-language regular expressions,
//! determines each function's extent from braces, indentation or closing
//! keywords, and scores cyclomatic complexity as one plus the number of
//! decision points in the body. Comments and string contents are blanked
//! before any pattern runs.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use codepulse_core::{
    AnalyzeError, BlockStyle, CommentSyntax, FileTotals, FunctionMetrics, Language,
};

use crate::analyzer::{AnalyzerOutput, FileAnalyzer};

/// Regex-based analyzer covering every supported language.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicAnalyzer;

impl HeuristicAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl FileAnalyzer for HeuristicAnalyzer {
    fn analyze(&self, path: &Path, language: Language) -> Result<AnalyzerOutput, AnalyzeError> {
        let bytes = std::fs::read(path).map_err(|source| AnalyzeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if bytes.contains(&0) {
            return Err(AnalyzeError::Unsupported {
                path: path.to_path_buf(),
            });
        }
        Ok(analyze_source(&String::from_utf8_lossy(&bytes), language))
    }

    fn name(&self) -> &str {
        "heuristic"
    }
}

/// Analyze source text already in memory.
pub fn analyze_source(text: &str, language: Language) -> AnalyzerOutput {
    let raw: Vec<&str> = text.lines().collect();
    let (code, comment_lines) = scrub(&raw, language);
    let rules = rules_for(language);

    let class_count = code
        .iter()
        .filter(|line| rules.classes.iter().any(|re| re.is_match(line)))
        .count() as u64;

    let mut functions = Vec::new();
    for (i, line) in code.iter().enumerate() {
        let Some((name, name_end)) = rules.declaration(line) else {
            continue;
        };
        let (parameters, sig_end) = parameter_count(&code, i, name_end);
        let Some(end) = extent(language, rules, &raw, &code, i, sig_end) else {
            continue;
        };

        let complexity = 1 + code[i..=end]
            .iter()
            .map(|l| {
                rules
                    .decisions
                    .iter()
                    .map(|re| re.find_iter(l).count() as u32)
                    .sum::<u32>()
            })
            .sum::<u32>();
        let length = (end - i + 1) as u32;

        functions.push(FunctionMetrics {
            name: name.into(),
            owner_relative_path: String::new(),
            start_line: i as u32 + 1,
            end_line: end as u32 + 1,
            length,
            parameters,
            complexity,
            density: complexity as f64 / length as f64,
        });
    }

    AnalyzerOutput {
        totals: FileTotals {
            total_lines: raw.len() as u64,
            comment_lines,
            class_count,
        },
        functions,
    }
}

// Lexing

/// Blank comments and string contents. Returns the code text of each line
/// and the number of lines that carry any comment.
fn scrub(lines: &[&str], language: Language) -> (Vec<String>, u64) {
    let syntax: CommentSyntax = language.comment_syntax();
    let mut code_lines = Vec::with_capacity(lines.len());
    let mut comment_lines = 0;
    let mut in_block = false;

    for line in lines {
        let mut code = String::with_capacity(line.len());
        let mut has_comment = in_block;
        let mut quote: Option<char> = None;
        let mut escaped = false;
        let mut i = 0;

        while i < line.len() {
            let rest = &line[i..];
            let Some(c) = rest.chars().next() else { break };

            if in_block {
                has_comment = true;
                if let Some((_, end)) = syntax.block {
                    if rest.starts_with(end) {
                        in_block = false;
                        i += end.len();
                        continue;
                    }
                }
                i += c.len_utf8();
                continue;
            }

            if let Some(q) = quote {
                if escaped {
                    escaped = false;
                    code.push(' ');
                } else if c == '\\' {
                    escaped = true;
                    code.push(' ');
                } else if c == q {
                    quote = None;
                    code.push(c);
                } else {
                    code.push(' ');
                }
                i += c.len_utf8();
                continue;
            }

            if let Some((start, _)) = syntax.block {
                if rest.starts_with(start) {
                    in_block = true;
                    has_comment = true;
                    i += start.len();
                    continue;
                }
            }
            if syntax.line.iter().any(|p| rest.starts_with(p)) {
                has_comment = true;
                break;
            }
            if opens_string(language, c, &rest[c.len_utf8()..]) {
                quote = Some(c);
            }
            code.push(c);
            i += c.len_utf8();
        }

        if has_comment {
            comment_lines += 1;
        }
        code_lines.push(code);
    }

    (code_lines, comment_lines)
}

/// A quote only opens a string if it closes on the same line. In Rust a
/// single quote is a char literal only when it closes right away, otherwise
/// it starts a lifetime.
fn opens_string(language: Language, c: char, after: &str) -> bool {
    match c {
        '\'' if language == Language::Rust => {
            after.starts_with('\\') || after.chars().nth(1) == Some('\'')
        }
        '"' | '\'' | '`' => after.contains(c),
        _ => false,
    }
}

fn indent_of(line: &str) -> usize {
    line.chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

/// Count top-level parameters of the list opening after `from` on line `i`.
/// Returns the count and the line on which the list closes.
fn parameter_count(code: &[String], i: usize, from: usize) -> (u32, usize) {
    let Some(open) = code[i].get(from..).and_then(|rest| rest.find('(')) else {
        return (0, i);
    };

    let mut depth = 0usize;
    let mut text = String::new();
    let mut start = from + open;
    for (j, line) in code.iter().enumerate().skip(i).take(32) {
        for c in line[start..].chars() {
            match c {
                '(' | '[' | '{' | '<' => {
                    depth += 1;
                    if depth > 1 {
                        text.push(c);
                    }
                }
                ')' | ']' | '}' | '>' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 && c == ')' {
                        return (count_params(&text), j);
                    }
                    text.push(c);
                }
                ',' if depth == 1 => text.push('\u{1}'),
                _ if depth >= 1 => text.push(c),
                _ => {}
            }
        }
        start = 0;
        text.push(' ');
    }
    (count_params(&text), i)
}

fn count_params(list: &str) -> u32 {
    let trimmed = list.trim();
    if trimmed.is_empty() || trimmed == "void" {
        return 0;
    }
    list.split('\u{1}').filter(|p| !p.trim().is_empty()).count() as u32
}

/// Last line (inclusive) of the function declared on line `i`, or `None`
/// when the declaration has no body.
fn extent(
    language: Language,
    rules: &Rules,
    raw: &[&str],
    code: &[String],
    i: usize,
    sig_end: usize,
) -> Option<usize> {
    let last = code.len() - 1;
    match language.block_style() {
        BlockStyle::Braces => {
            let opens_here = code[sig_end].contains('{');
            let opens_next = code
                .get(sig_end + 1)
                .is_some_and(|l| l.trim_start().starts_with('{'));
            if !opens_here && !opens_next {
                let sig = code[sig_end].trim_end();
                // A bodiless prototype or abstract declaration
                if sig.ends_with(';') && !sig.contains("=>") {
                    return None;
                }
                return Some(sig_end);
            }

            let mut depth = 0i32;
            let mut opened = false;
            for (j, line) in code.iter().enumerate().skip(i) {
                for c in line.chars() {
                    match c {
                        '{' => {
                            depth += 1;
                            opened = true;
                        }
                        '}' => depth -= 1,
                        _ => {}
                    }
                    if opened && depth <= 0 {
                        return Some(j);
                    }
                }
            }
            Some(last)
        }
        BlockStyle::Indentation => {
            let base = indent_of(raw[i]);
            let mut end = sig_end;
            for (j, line) in code.iter().enumerate().skip(sig_end + 1) {
                if line.trim().is_empty() {
                    continue;
                }
                if indent_of(raw[j]) <= base {
                    break;
                }
                end = j;
            }
            Some(end)
        }
        BlockStyle::EndKeyword => {
            let closer = rules.closer.as_ref()?;
            let mut depth = 0i32;
            for (j, line) in code.iter().enumerate().skip(i) {
                if j == i {
                    depth += 1;
                } else if rules.opener.as_ref().is_some_and(|re| re.is_match(line)) {
                    depth += 1;
                }
                if closer.is_match(line) {
                    depth -= 1;
                }
                if depth <= 0 {
                    return Some(j);
                }
            }
            Some(last)
        }
        BlockStyle::Markup => None,
    }
}

// Language rules

struct Rules {
    functions: Vec<Regex>,
    classes: Vec<Regex>,
    decisions: Vec<Regex>,
    opener: Option<Regex>,
    closer: Option<Regex>,
}

/// Words a C-like declaration pattern can mistake for a function name.
const NOT_FUNCTIONS: &[&str] = &[
    "if", "for", "foreach", "while", "switch", "catch", "return", "else", "new", "sizeof",
    "using", "lock", "fixed", "when", "function", "typeof", "delete", "throw", "do", "elif",
    "case", "await", "yield",
];

impl Rules {
    /// Function name and the byte offset just past it.
    fn declaration<'a>(&self, line: &'a str) -> Option<(&'a str, usize)> {
        self.functions.iter().find_map(|re| {
            let name = re.captures(line)?.name("name")?;
            if NOT_FUNCTIONS.contains(&name.as_str()) {
                return None;
            }
            Some((name.as_str(), name.end()))
        })
    }
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| match Regex::new(p) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::error!(pattern = *p, error = %e, "invalid analyzer pattern");
                None
            }
        })
        .collect()
}

fn compile_one(pattern: &str) -> Option<Regex> {
    compile(&[pattern]).pop()
}

fn decisions(words: &[&str]) -> Vec<Regex> {
    compile(&[
        &format!(r"\b(?:{})\b", words.join("|")),
        r"&&|\|\||\s\?\s",
    ])
}

const C_DECISIONS: &[&str] = &["if", "for", "foreach", "while", "case", "catch"];

fn rules_for(language: Language) -> &'static Rules {
    match language {
        Language::Python => &PYTHON,
        Language::GdScript => &GDSCRIPT,
        Language::Ruby => &RUBY,
        Language::Lua => &LUA,
        Language::Perl => &PERL,
        Language::Erlang => &ERLANG,
        Language::Fortran => &FORTRAN,
        Language::JavaScript | Language::TypeScript | Language::Vue => &SCRIPT,
        Language::Php => &PHP,
        Language::Rust => &RUST,
        Language::Go => &GO,
        Language::Kotlin => &KOTLIN,
        Language::Swift => &SWIFT,
        Language::Scala => &SCALA,
        Language::Solidity => &SOLIDITY,
        Language::Zig => &ZIG,
        Language::Ttcn3 => &TTCN3,
        Language::Html => &MARKUP,
        Language::C
        | Language::Cpp
        | Language::Java
        | Language::CSharp
        | Language::ObjectiveC
        | Language::ObjectiveCpp => &C_LIKE,
    }
}

static PYTHON: LazyLock<Rules> = LazyLock::new(|| Rules {
    functions: compile(&[r"^\s*(?:async\s+)?def\s+(?P<name>\w+)\s*\("]),
    classes: compile(&[r"^\s*class\s+\w"]),
    decisions: decisions(&["if", "elif", "for", "while", "except", "and", "or", "case"]),
    opener: None,
    closer: None,
});

static GDSCRIPT: LazyLock<Rules> = LazyLock::new(|| Rules {
    functions: compile(&[r"^\s*(?:static\s+)?func\s+(?P<name>\w+)\s*\("]),
    classes: compile(&[r"^\s*class(?:_name)?\s+\w"]),
    decisions: decisions(&["if", "elif", "for", "while", "match", "and", "or"]),
    opener: None,
    closer: None,
});

static RUBY: LazyLock<Rules> = LazyLock::new(|| Rules {
    functions: compile(&[r"^\s*def\s+(?:self\.)?(?P<name>\w+[?!=]?)"]),
    classes: compile(&[r"^\s*(?:class|module)\s+[A-Z]"]),
    decisions: decisions(&[
        "if", "elsif", "unless", "while", "until", "for", "when", "rescue", "and", "or",
    ]),
    opener: compile_one(
        r"^\s*(?:def|class|module|if|unless|while|until|case|begin|for)\b|\bdo\s*(?:\|[^|]*\|)?\s*$",
    ),
    closer: compile_one(r"^\s*end\b"),
});

static LUA: LazyLock<Rules> = LazyLock::new(|| Rules {
    functions: compile(&[
        r"^\s*(?:local\s+)?function\s+(?P<name>[\w.:]+)\s*\(",
        r"^\s*(?:local\s+)?(?P<name>[\w.]+)\s*=\s*function\s*\(",
    ]),
    classes: Vec::new(),
    decisions: decisions(&["if", "elseif", "for", "while", "repeat", "and", "or"]),
    opener: compile_one(
        r"^\s*(?:local\s+)?function\b|=\s*function\b|^\s*(?:if|while|for)\b.*\b(?:then|do)\s*$|^\s*repeat\b",
    ),
    closer: compile_one(r"^\s*(?:end|until)\b"),
});

static PERL: LazyLock<Rules> = LazyLock::new(|| Rules {
    functions: compile(&[r"^\s*sub\s+(?P<name>\w+)"]),
    classes: compile(&[r"^\s*package\s+[\w:]+"]),
    decisions: decisions(&[
        "if", "elsif", "unless", "while", "until", "for", "foreach", "and", "or",
    ]),
    opener: None,
    closer: None,
});

static ERLANG: LazyLock<Rules> = LazyLock::new(|| Rules {
    functions: compile(&[r"^(?P<name>[a-z]\w*)\s*\("]),
    classes: compile(&[r"^-module\("]),
    decisions: decisions(&["case", "if", "receive", "when", "catch", "andalso", "orelse"]),
    opener: None,
    closer: compile_one(r"\.\s*$"),
});

static FORTRAN: LazyLock<Rules> = LazyLock::new(|| Rules {
    functions: compile(&[
        r"(?i)^\s*(?:(?:pure|elemental|recursive|impure|integer|real|logical|complex|character|double\s+precision)\s+)*(?:function|subroutine)\s+(?P<name>\w+)",
    ]),
    classes: compile(&[r"(?i)^\s*module\s+\w+\s*$", r"(?i)^\s*type\s*(?:,[^:]*)?::\s*\w"]),
    decisions: decisions(&["if", "do", "case", "while"]),
    opener: compile_one(
        r"(?i)^\s*(?:(?:pure|elemental|recursive|impure|integer|real|logical)\s+)*(?:function|subroutine)\b|^\s*(?:if\b.*\bthen|do\b|select\b)",
    ),
    closer: compile_one(r"(?i)^\s*end\b"),
});

static SCRIPT: LazyLock<Rules> = LazyLock::new(|| Rules {
    functions: compile(&[
        r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*(?P<name>[\w$]+)",
        r"^\s*(?:export\s+)?(?:const|let|var)\s+(?P<name>[\w$]+)\s*(?::[^=]+)?=\s*(?:async\s+)?(?:function\b[^(]*)?\([^)]*\)\s*(?::[^=]+)?(?:=>|\{)",
        r"^\s*(?:(?:public|private|protected|static|async|readonly|override|abstract|get|set)\s+)*(?P<name>[\w$]+)\s*(?:<[^>]*>)?\s*\([^;]*\)\s*(?::\s*[^;{]+)?\{\s*$",
    ]),
    classes: compile(&[
        r"^\s*(?:export\s+)?(?:default\s+)?(?:abstract\s+)?(?:class|interface|enum)\s+[\w$]",
    ]),
    decisions: decisions(&["if", "for", "while", "case", "catch"]),
    opener: None,
    closer: None,
});

static PHP: LazyLock<Rules> = LazyLock::new(|| Rules {
    functions: compile(&[
        r"^\s*(?:(?:public|private|protected|static|abstract|final)\s+)*function\s+&?(?P<name>\w+)",
    ]),
    classes: compile(&[r"^\s*(?:(?:abstract|final|readonly)\s+)*(?:class|interface|trait|enum)\s+\w"]),
    decisions: decisions(&["if", "elseif", "for", "foreach", "while", "case", "catch", "and", "or"]),
    opener: None,
    closer: None,
});

static RUST: LazyLock<Rules> = LazyLock::new(|| Rules {
    functions: compile(&[
        r#"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:default\s+)?(?:const\s+)?(?:async\s+)?(?:unsafe\s+)?(?:extern\s+"[^"]*"\s+)?fn\s+(?P<name>\w+)"#,
    ]),
    classes: compile(&[r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:struct|enum|trait|union)\s+\w"]),
    decisions: decisions(&["if", "for", "while", "loop"]),
    opener: None,
    closer: None,
});

static GO: LazyLock<Rules> = LazyLock::new(|| Rules {
    functions: compile(&[r"^\s*func\s+(?:\([^)]*\)\s*)?(?P<name>\w+)"]),
    classes: compile(&[r"^\s*type\s+\w+\s+(?:struct|interface)\b"]),
    decisions: decisions(&["if", "for", "case", "select"]),
    opener: None,
    closer: None,
});

static KOTLIN: LazyLock<Rules> = LazyLock::new(|| Rules {
    functions: compile(&[
        r"^\s*(?:(?:public|private|protected|internal|override|open|abstract|suspend|inline|operator|infix|tailrec|final)\s+)*fun\s+(?:<[^>]*>\s*)?(?:[\w.]+\.)?(?P<name>\w+)",
    ]),
    classes: compile(&[
        r"^\s*(?:(?:public|private|protected|internal|abstract|open|sealed|data|enum|inner|final)\s+)*(?:class|interface|object)\s+\w",
    ]),
    decisions: decisions(&["if", "for", "while", "when", "catch"]),
    opener: None,
    closer: None,
});

static SWIFT: LazyLock<Rules> = LazyLock::new(|| Rules {
    functions: compile(&[
        r"^\s*(?:(?:public|private|fileprivate|internal|open|override|static|class|final|mutating|@\w+)\s+)*func\s+(?P<name>\w+)",
        r"^\s*(?:(?:public|private|convenience|required|override)\s+)*(?P<name>init)\s*[?!]?\s*\(",
    ]),
    classes: compile(&[
        r"^\s*(?:(?:public|private|fileprivate|internal|open|final)\s+)*(?:class|struct|protocol|enum|actor)\s+\w",
    ]),
    decisions: decisions(&["if", "for", "while", "case", "catch", "guard"]),
    opener: None,
    closer: None,
});

static SCALA: LazyLock<Rules> = LazyLock::new(|| Rules {
    functions: compile(&[
        r"^\s*(?:(?:override|private|protected|final|implicit)\s+)*def\s+(?P<name>\w+)",
    ]),
    classes: compile(&[
        r"^\s*(?:(?:abstract|final|sealed|case|implicit)\s+)*(?:class|trait|object)\s+\w",
    ]),
    decisions: decisions(&["if", "for", "while", "case", "catch"]),
    opener: None,
    closer: None,
});

static SOLIDITY: LazyLock<Rules> = LazyLock::new(|| Rules {
    functions: compile(&[
        r"^\s*function\s+(?P<name>\w+)",
        r"^\s*(?P<name>constructor|modifier)\b",
    ]),
    classes: compile(&[r"^\s*(?:abstract\s+)?(?:contract|interface|library)\s+\w"]),
    decisions: decisions(&["if", "for", "while", "require"]),
    opener: None,
    closer: None,
});

static ZIG: LazyLock<Rules> = LazyLock::new(|| Rules {
    functions: compile(&[r"^\s*(?:pub\s+)?(?:export\s+)?(?:inline\s+)?fn\s+(?P<name>\w+)"]),
    classes: compile(&[r"=\s*(?:extern\s+|packed\s+)?(?:struct|enum|union)\b"]),
    decisions: decisions(&["if", "for", "while", "catch", "orelse", "and", "or"]),
    opener: None,
    closer: None,
});

static TTCN3: LazyLock<Rules> = LazyLock::new(|| Rules {
    functions: compile(&[r"^\s*(?:function|testcase|altstep)\s+(?P<name>\w+)"]),
    classes: compile(&[r"^\s*module\s+\w"]),
    decisions: decisions(&["if", "for", "while", "alt", "interleave"]),
    opener: None,
    closer: None,
});

static C_LIKE: LazyLock<Rules> = LazyLock::new(|| Rules {
    functions: compile(&[
        r"^\s*(?:[\w:<>,\[\]*&~]+\s+)+[*&]*(?P<name>[\w:~]+)\s*\([^;]*$",
        r"^\s*[-+]\s*\([^)]*\)\s*(?P<name>\w+)",
    ]),
    classes: compile(&[
        r"^\s*(?:(?:public|private|protected|internal|abstract|final|sealed|static|partial|typedef)\s+)*(?:class|struct|interface|enum|record)\s+\w+[^;]*$",
        r"^\s*@(?:interface|protocol)\s+\w",
    ]),
    decisions: decisions(C_DECISIONS),
    opener: None,
    closer: None,
});

static MARKUP: LazyLock<Rules> = LazyLock::new(|| Rules {
    functions: Vec::new(),
    classes: Vec::new(),
    decisions: decisions(&["if"]),
    opener: None,
    closer: None,
});

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    fn names(output: &AnalyzerOutput) -> Vec<&str> {
        output.functions.iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn test_every_pattern_compiles() {
        for language in Language::iter() {
            let rules = rules_for(language);
            if language != Language::Html && language != Language::Lua {
                assert!(!rules.classes.is_empty(), "{language}");
            }
            if language != Language::Html {
                assert!(!rules.functions.is_empty(), "{language}");
            }
            if language.block_style() == BlockStyle::EndKeyword {
                assert!(rules.closer.is_some(), "{language}");
            }
        }
        assert_eq!(RUBY.functions.len(), 1);
        assert_eq!(SCRIPT.functions.len(), 3);
        assert_eq!(C_LIKE.functions.len(), 2);
    }

    #[test]
    fn test_python() {
        let src = "\
# module comment
class Greeter:
    \"\"\"Says hello.\"\"\"

    def greet(self, name, punctuation='!'):
        if name and punctuation:
            return 'hi ' + name
        for c in name:
            pass
        return ''

def main():
    pass
";
        let out = analyze_source(src, Language::Python);
        assert_eq!(out.totals.total_lines, 13);
        assert_eq!(out.totals.comment_lines, 2);
        assert_eq!(out.totals.class_count, 1);
        assert_eq!(names(&out), vec!["greet", "main"]);

        let greet = &out.functions[0];
        assert_eq!(greet.start_line, 5);
        assert_eq!(greet.end_line, 10);
        assert_eq!(greet.parameters, 3);
        // if, and, for
        assert_eq!(greet.complexity, 4);
        assert_eq!(greet.density, 4.0 / 6.0);

        let main = &out.functions[1];
        assert_eq!(main.complexity, 1);
        assert_eq!(main.parameters, 0);
        assert_eq!(main.length, 2);
    }

    #[test]
    fn test_rust_braces_and_strings() {
        let src = r#"
pub struct Config;

/// Doc comment
pub fn parse<'a>(input: &'static str, strict: bool) -> Option<&'a str> {
    let brace = "{ if while }";
    if strict && input.is_empty() {
        return None;
    }
    None
}

fn empty() {}
"#;
        let out = analyze_source(src, Language::Rust);
        assert_eq!(out.totals.class_count, 1);
        assert_eq!(out.totals.comment_lines, 1);
        assert_eq!(names(&out), vec!["parse", "empty"]);

        let parse = &out.functions[0];
        assert_eq!(parse.start_line, 5);
        assert_eq!(parse.end_line, 11);
        assert_eq!(parse.parameters, 2);
        // if, &&
        assert_eq!(parse.complexity, 3);

        assert_eq!(out.functions[1].length, 1);
    }

    #[test]
    fn test_javascript_forms() {
        let src = "\
export function load(path, opts) {
  return path ? path : opts;
}
const add = (a, b) => a + b;
const value = (1 + 2) * 3;
class Store {
  save(item) {
    if (item) { return true; }
    return false;
  }
}
";
        let out = analyze_source(src, Language::JavaScript);
        assert_eq!(names(&out), vec!["load", "add", "save"]);
        assert_eq!(out.totals.class_count, 1);
        assert_eq!(out.functions[0].complexity, 2);
        assert_eq!(out.functions[1].parameters, 2);
        assert_eq!(out.functions[1].length, 1);
        assert_eq!(out.functions[2].start_line, 7);
        assert_eq!(out.functions[2].end_line, 10);
    }

    #[test]
    fn test_c_prototypes_are_skipped() {
        let src = "\
int add(int a, int b);

/* block
   comment */
int add(int a, int b)
{
    while (a > 0) { a--; }
    return a + b;
}
";
        let out = analyze_source(src, Language::C);
        assert_eq!(names(&out), vec!["add"]);
        assert_eq!(out.totals.comment_lines, 2);
        let add = &out.functions[0];
        assert_eq!(add.start_line, 5);
        assert_eq!(add.end_line, 9);
        assert_eq!(add.complexity, 2);
    }

    #[test]
    fn test_ruby_end_keywords() {
        let src = "\
class Account
  def deposit(amount)
    if amount > 0
      @balance += amount
    end
  end

  def empty?
  end
end
";
        let out = analyze_source(src, Language::Ruby);
        assert_eq!(out.totals.class_count, 1);
        assert_eq!(names(&out), vec!["deposit", "empty?"]);
        assert_eq!(out.functions[0].end_line, 6);
        assert_eq!(out.functions[0].complexity, 2);
        assert_eq!(out.functions[1].parameters, 0);
    }

    #[test]
    fn test_no_functions_is_valid() {
        let out = analyze_source("<html><body></body></html>\n", Language::Html);
        assert!(out.functions.is_empty());
        assert_eq!(out.totals.total_lines, 1);
    }

    #[test]
    fn test_binary_file_is_unsupported() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("blob.c");
        std::fs::write(&path, [0u8, 1, 2]).unwrap();
        let err = HeuristicAnalyzer::new()
            .analyze(&path, Language::C)
            .unwrap_err();
        assert!(matches!(err, AnalyzeError::Unsupported { .. }));
    }
}
