//! Loose version parsing for tool output and version specs.
//!
//! Handles what `ionic -v`, `cordova -v` and user-supplied version inputs
//! actually look like: interactive-mode cursor sequences, `v`/`=v` prefixes,
//! banners, pre-release suffixes and trailing annotations.

use std::{cmp::Ordering, fmt, sync::LazyLock};

use regex::Regex;

/// Cursor-movement sequences left behind by interactive CLIs,
/// with or without the leading escape byte (e.g. `\x1b[1000D`, `[K`).
static CONTROL_SEQUENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b?\[[0-9;?]*[A-Za-z]").expect("valid regex"));

static VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:\.\d+)*)(?:-([0-9A-Za-z][0-9A-Za-z.\-]*))?").expect("valid regex")
});

/// Errors that can occur while parsing versions or constraints.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("no version found in {0:?}")]
    NoVersion(String),

    #[error("version segment {segment:?} in {input:?} is out of range")]
    Segment { input: String, segment: String },

    #[error("unknown comparison operator {0:?}")]
    Operator(String),
}

pub type Result<T> = core::result::Result<T, ParseError>;

/// A dotted-integer version with an optional pre-release suffix.
///
/// Missing trailing segments compare as zero, so `3.8` equals `3.8.0`.
/// A pre-release orders before the release it precedes.
#[derive(Debug, Clone)]
pub struct SemanticVersion {
    segments: Vec<u64>,
    pre: Option<String>,
}

impl SemanticVersion {
    /// Creates a version from explicit segments.
    ///
    /// An empty segment list is treated as `0`.
    #[cfg(test)]
    pub fn new(segments: impl Into<Vec<u64>>) -> Self {
        let mut segments = segments.into();
        if segments.is_empty() {
            segments.push(0);
        }
        Self {
            segments,
            pre: None,
        }
    }

    pub fn major(&self) -> u64 {
        self.segment(0)
    }

    /// Evaluate a threshold expression such as `"< 3.8.0"` against this version.
    pub fn satisfies(&self, expression: &str) -> Result<bool> {
        Ok(Constraint::parse(expression)?.matches(self))
    }

    fn segment(&self, index: usize) -> u64 {
        self.segments.get(index).copied().unwrap_or(0)
    }
}

impl Ord for SemanticVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.segments.len().max(other.segments.len());
        for i in 0..len {
            match self.segment(i).cmp(&other.segment(i)) {
                Ordering::Equal => {}
                unequal => return unequal,
            }
        }
        match (&self.pre, &other.pre) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for SemanticVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SemanticVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SemanticVersion {}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self.segments.iter().map(u64::to_string).collect();
        write!(f, "{}", joined.join("."))?;
        if let Some(pre) = &self.pre {
            write!(f, "-{pre}")?;
        }
        Ok(())
    }
}

/// Parse the first version found in free-form text.
///
/// Control sequences are stripped first so that their numeric parameters
/// are never mistaken for a version.
pub fn parse_version(text: &str) -> Result<SemanticVersion> {
    let cleaned = CONTROL_SEQUENCE.replace_all(text, "");
    let captures = VERSION
        .captures(&cleaned)
        .ok_or_else(|| ParseError::NoVersion(text.to_string()))?;

    let segments = captures[1]
        .split('.')
        .map(|segment| {
            segment.parse::<u64>().map_err(|_| ParseError::Segment {
                input: text.to_string(),
                segment: segment.to_string(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(SemanticVersion {
        segments,
        pre: captures.get(2).map(|m| m.as_str().to_string()),
    })
}

/// Parse only the major component of a loose version spec.
///
/// Never defaults: `"latest"` and other non-numeric specs are errors.
pub fn major_version(text: &str) -> Result<u64> {
    parse_version(text).map(|v| v.major())
}

/// Parse the version printed by `<tool> -v`.
///
/// The first line carrying a full `major.minor.patch` wins, so warnings
/// printed before the version (`Node 14 is deprecated`) are skipped.
/// Falls back to [`parse_version`] over the whole output.
pub fn parse_tool_output(output: &str) -> Result<SemanticVersion> {
    output
        .lines()
        .filter_map(|line| parse_version(line).ok())
        .find(|v| v.segments.len() >= 3)
        .map_or_else(|| parse_version(output), Ok)
}

/// Comparison operator of a [`Constraint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A single threshold comparison such as `< 3.8.0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pub op: Operator,
    pub version: SemanticVersion,
}

impl Constraint {
    /// Parse `<op> <version>`. A bare version means equality.
    pub fn parse(expression: &str) -> Result<Self> {
        let expression = expression.trim();
        let split = expression
            .find(|c: char| !matches!(c, '<' | '>' | '=' | '!'))
            .unwrap_or(expression.len());
        let (op, rest) = expression.split_at(split);

        let op = match op {
            "" | "=" | "==" => Operator::Eq,
            "!=" => Operator::Ne,
            "<" => Operator::Lt,
            "<=" => Operator::Le,
            ">" => Operator::Gt,
            ">=" => Operator::Ge,
            other => return Err(ParseError::Operator(other.to_string())),
        };

        Ok(Self {
            op,
            version: parse_version(rest.trim())?,
        })
    }

    pub fn matches(&self, version: &SemanticVersion) -> bool {
        let ordering = version.cmp(&self.version);
        match self.op {
            Operator::Eq => ordering == Ordering::Equal,
            Operator::Ne => ordering != Ordering::Equal,
            Operator::Lt => ordering == Ordering::Less,
            Operator::Le => ordering != Ordering::Greater,
            Operator::Gt => ordering == Ordering::Greater,
            Operator::Ge => ordering != Ordering::Less,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Parsing ──

    #[test]
    fn parses_plain_version() {
        let v = parse_version("7.1.0").unwrap();
        assert_eq!(v.segments, [7, 1, 0]);
        assert_eq!(v.pre.as_deref(), None);
    }

    #[test]
    fn strips_interactive_cursor_sequences() {
        let v = parse_version("\u{1b}[1000D\u{1b}[K3.2.0").unwrap();
        assert_eq!(v.segments, [3, 2, 0]);

        // Escape byte already stripped by the capturing shell.
        let v = parse_version("[1000D[K3.2.0").unwrap();
        assert_eq!(v.segments, [3, 2, 0]);
    }

    #[test]
    fn ignores_trailing_annotations() {
        let v = parse_version("9.0.0 (cordova-lib@9.0.1)").unwrap();
        assert_eq!(v.to_string(), "9.0.0");
    }

    #[test]
    fn finds_version_after_banner() {
        let v = parse_version("Ionic CLI v6.20.1\n").unwrap();
        assert_eq!(v.major(), 6);
        assert_eq!(v.segment(1), 20);
        assert_eq!(v.segment(2), 1);
    }

    #[test]
    fn keeps_pre_release_suffix() {
        let v = parse_version("5.1.14-alpha.7").unwrap();
        assert_eq!(v.segments, [5, 1, 14]);
        assert_eq!(v.pre.as_deref(), Some("alpha.7"));
        assert_eq!(v.to_string(), "5.1.14-alpha.7");
    }

    #[test]
    fn non_numeric_input_fails() {
        assert_eq!(
            parse_version("beta"),
            Err(ParseError::NoVersion("beta".to_string()))
        );
        assert!(parse_version("").is_err());
    }

    #[test]
    fn oversized_segment_fails() {
        let err = parse_version("99999999999999999999999.1").unwrap_err();
        assert!(matches!(err, ParseError::Segment { .. }));
    }

    #[test]
    fn tool_output_skips_warning_lines() {
        let output = "[WARN] Node 14 is deprecated, upgrade to 16\n\u{1b}[1000D\u{1b}[K6.20.1";
        assert_eq!(parse_tool_output(output).unwrap().to_string(), "6.20.1");
    }

    #[test]
    fn tool_output_falls_back_to_first_number() {
        assert_eq!(parse_tool_output("cordova 9").unwrap().major(), 9);
        assert!(parse_tool_output("command not found").is_err());
    }

    // ── Major version ──

    #[test]
    fn major_version_of_loose_specs() {
        let cases = [
            ("5.1.14", 5),
            ("11.1.14", 11),
            ("v5.1.14", 5),
            ("=v5.1.14", 5),
            ("7", 7),
            ("5.6", 5),
            ("5.x", 5),
            ("6.1.14.6.3", 6),
            ("5.1.14-alpha.7", 5),
            ("05.01.14", 5),
        ];
        for (input, want) in cases {
            assert_eq!(major_version(input), Ok(want), "input: {input}");
        }
    }

    #[test]
    fn major_version_rejects_dist_tags() {
        assert!(major_version("latest").is_err());
        assert!(major_version("beta").is_err());
    }

    // ── Ordering ──

    #[test]
    fn missing_segments_compare_as_zero() {
        assert_eq!(SemanticVersion::new([3, 8]), SemanticVersion::new([3, 8, 0]));
        assert!(SemanticVersion::new([3, 7, 9]) < SemanticVersion::new([3, 8]));
        assert!(SemanticVersion::new([6, 1, 14, 6, 3]) > SemanticVersion::new([6, 1, 14]));
    }

    #[test]
    fn pre_release_orders_before_release() {
        let pre = parse_version("3.8.0-beta.1").unwrap();
        let release = parse_version("3.8.0").unwrap();
        assert!(pre < release);
    }

    // ── Constraints ──

    #[test]
    fn threshold_below() {
        let old = parse_version("3.2.0").unwrap();
        let new = parse_version("3.8.0").unwrap();
        assert_eq!(old.satisfies("< 3.8.0"), Ok(true));
        assert_eq!(new.satisfies("< 3.8.0"), Ok(false));
    }

    #[test]
    fn all_operators() {
        let v = SemanticVersion::new([7, 1, 0]);
        assert_eq!(v.satisfies(">= 7.0.0"), Ok(true));
        assert_eq!(v.satisfies("> 7.1"), Ok(false));
        assert_eq!(v.satisfies("<= 7.1.0"), Ok(true));
        assert_eq!(v.satisfies("= 7.1"), Ok(true));
        assert_eq!(v.satisfies("7.1.0"), Ok(true));
        assert_eq!(v.satisfies("!= 7.1.0"), Ok(false));
    }

    #[test]
    fn constraint_without_space() {
        let c = Constraint::parse("<3.8.0").unwrap();
        assert_eq!(c.op, Operator::Lt);
        assert_eq!(c.version, SemanticVersion::new([3, 8, 0]));
    }

    #[test]
    fn unknown_operator_fails() {
        assert_eq!(
            Constraint::parse("=> 3.8.0"),
            Err(ParseError::Operator("=>".to_string()))
        );
        assert!(Constraint::parse("<").is_err());
    }
}
