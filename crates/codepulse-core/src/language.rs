//! Source language detection by file extension.

use std::path::Path;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// A source language the analyzers understand.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
pub enum Language {
    JavaScript,
    TypeScript,
    Python,
    Java,
    C,
    #[strum(serialize = "C++")]
    #[serde(rename = "C++")]
    Cpp,
    #[strum(serialize = "C#")]
    #[serde(rename = "C#")]
    CSharp,
    Ruby,
    #[strum(serialize = "PHP")]
    #[serde(rename = "PHP")]
    Php,
    Go,
    Rust,
    Swift,
    Kotlin,
    #[strum(serialize = "HTML")]
    #[serde(rename = "HTML")]
    Html,
    Vue,
    Scala,
    Lua,
    Erlang,
    Zig,
    Perl,
    Solidity,
    #[strum(serialize = "TTCN-3")]
    #[serde(rename = "TTCN-3")]
    Ttcn3,
    #[strum(serialize = "Objective-C")]
    #[serde(rename = "Objective-C")]
    ObjectiveC,
    #[strum(serialize = "Objective-C++")]
    #[serde(rename = "Objective-C++")]
    ObjectiveCpp,
    Fortran,
    #[strum(serialize = "GDScript")]
    #[serde(rename = "GDScript")]
    GdScript,
}

/// How a language delimits function bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStyle {
    /// `{ ... }` blocks.
    Braces,
    /// Bodies are the indented lines following the declaration.
    Indentation,
    /// Bodies close with an `end` keyword.
    EndKeyword,
    /// Markup without functions of its own.
    Markup,
}

/// Comment markers for a language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommentSyntax {
    /// Line comment prefixes.
    pub line: &'static [&'static str],
    /// Block comment delimiters, if any.
    pub block: Option<(&'static str, &'static str)>,
}

const C_LIKE: CommentSyntax = CommentSyntax {
    line: &["//"],
    block: Some(("/*", "*/")),
};

const HASH: CommentSyntax = CommentSyntax {
    line: &["#"],
    block: None,
};

impl Language {
    /// Detect the language of a path from its extension.
    ///
    /// Returns `None` for unsupported files.
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        Self::from_extension(&ext)
    }

    /// Look up a language by bare extension (no leading dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        let lang = match ext {
            "js" | "jsx" | "mjs" | "cjs" => Self::JavaScript,
            "ts" | "tsx" => Self::TypeScript,
            "py" => Self::Python,
            "java" => Self::Java,
            "c" | "h" => Self::C,
            "cpp" | "cc" | "cxx" | "hpp" => Self::Cpp,
            "cs" => Self::CSharp,
            "rb" => Self::Ruby,
            "php" | "phtml" | "php3" | "php4" | "php5" | "phps" => Self::Php,
            "go" => Self::Go,
            "rs" => Self::Rust,
            "swift" => Self::Swift,
            "kt" | "kts" => Self::Kotlin,
            "html" | "htm" => Self::Html,
            "vue" => Self::Vue,
            "scala" | "sc" => Self::Scala,
            "lua" => Self::Lua,
            "erl" | "hrl" => Self::Erlang,
            "zig" => Self::Zig,
            "pl" | "pm" | "pod" | "t" => Self::Perl,
            "sol" => Self::Solidity,
            "ttcn3" | "ttcn" | "3mp" => Self::Ttcn3,
            "m" => Self::ObjectiveC,
            "mm" => Self::ObjectiveCpp,
            "f" | "f77" | "f90" | "f95" | "f03" | "f08" | "for" | "ftn" => Self::Fortran,
            "gd" => Self::GdScript,
            _ => return None,
        };
        Some(lang)
    }

    /// Check whether a path has a supported extension.
    pub fn is_supported(path: impl AsRef<Path>) -> bool {
        Self::from_path(path).is_some()
    }

    /// Comment markers used by this language.
    pub fn comment_syntax(self) -> CommentSyntax {
        match self {
            Self::Python | Self::GdScript => CommentSyntax {
                line: &["#"],
                block: Some(("\"\"\"", "\"\"\"")),
            },
            Self::Ruby => CommentSyntax {
                line: &["#"],
                block: Some(("=begin", "=end")),
            },
            Self::Perl => HASH,
            Self::Lua => CommentSyntax {
                line: &["--"],
                block: Some(("--[[", "]]")),
            },
            Self::Erlang => CommentSyntax {
                line: &["%"],
                block: None,
            },
            Self::Fortran => CommentSyntax {
                line: &["!"],
                block: None,
            },
            Self::Php => CommentSyntax {
                line: &["//", "#"],
                block: Some(("/*", "*/")),
            },
            Self::Html | Self::Vue => CommentSyntax {
                line: &[],
                block: Some(("<!--", "-->")),
            },
            Self::Zig => CommentSyntax {
                line: &["//"],
                block: None,
            },
            _ => C_LIKE,
        }
    }

    /// How function bodies are delimited.
    pub fn block_style(self) -> BlockStyle {
        match self {
            Self::Python | Self::GdScript => BlockStyle::Indentation,
            Self::Ruby | Self::Lua | Self::Fortran | Self::Erlang => BlockStyle::EndKeyword,
            Self::Html => BlockStyle::Markup,
            _ => BlockStyle::Braces,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_from_path() {
        assert_eq!(Language::from_path("src/app.py"), Some(Language::Python));
        assert_eq!(Language::from_path("lib/Foo.CPP"), Some(Language::Cpp));
        assert_eq!(Language::from_path("README.md"), None);
        assert_eq!(Language::from_path("Makefile"), None);
    }

    #[test]
    fn test_display_names_round_trip() {
        assert_eq!(Language::Cpp.to_string(), "C++");
        assert_eq!(Language::from_str("C#").unwrap(), Language::CSharp);
        assert_eq!(
            serde_json::to_string(&Language::ObjectiveCpp).unwrap(),
            "\"Objective-C++\""
        );
    }

    #[test]
    fn test_block_style() {
        assert_eq!(Language::Python.block_style(), BlockStyle::Indentation);
        assert_eq!(Language::Rust.block_style(), BlockStyle::Braces);
        assert_eq!(Language::Ruby.block_style(), BlockStyle::EndKeyword);
    }
}
