// Built-in rewrite handlers
// Each handler pairs a regex precondition with a template rewrite and is
// independently testable. A handler returns None when nothing matches.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::EngineResult;
use crate::transform::Transformation;

/// Language the built-in handlers understand
pub const PYTHON: &str = "python";

const IDENT: &str = r"[A-Za-z_]\w*";
const TARGET: &str = r"[A-Za-z_]\w*(?:[ \t]*,[ \t]*[A-Za-z_]\w*)*";

/// `acc = []` followed by a `for` header at the same indentation
fn list_loop_header() -> String {
    format!(
        r"(?m)^(?P<indent>[ \t]*)(?P<acc>{IDENT})[ \t]*=[ \t]*\[\][ \t]*\n(?P<for_indent>[ \t]*)for[ \t]+(?P<var>{TARGET})[ \t]+in[ \t]+(?P<iter>[^\n]+?):[ \t]*\n"
    )
}

static NESTED_LOOPS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"{}[ \t]+for[ \t]+(?P<inner_var>{TARGET})[ \t]+in[ \t]+(?P<inner_iter>[^\n]+?):[ \t]*\n[ \t]+(?P<target>{IDENT})\.append\((?P<expr>[^\n]*)\)[ \t]*$",
        list_loop_header()
    ))
    .unwrap()
});

static APPEND_LOOP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"{}[ \t]+(?P<target>{IDENT})\.append\((?P<expr>[^\n]*)\)[ \t]*$",
        list_loop_header()
    ))
    .unwrap()
});

static CONDITIONAL_APPEND_LOOP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"{}[ \t]+if[ \t]+(?P<cond>[^\n]+?):[ \t]*\n[ \t]+(?P<target>{IDENT})\.append\((?P<expr>[^\n]*)\)[ \t]*$",
        list_loop_header()
    ))
    .unwrap()
});

static UNIQUE_APPEND_LOOP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"{}[ \t]+if[ \t]+(?P<item>{IDENT})[ \t]+not[ \t]+in[ \t]+(?P<seen>{IDENT})[ \t]*:[ \t]*\n[ \t]+(?P<target>{IDENT})\.append\((?P<appended>{IDENT})\)[ \t]*$",
        list_loop_header()
    ))
    .unwrap()
});

static STRING_CONCAT_LOOP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r#"(?m)^(?P<indent>[ \t]*)(?P<acc>{IDENT})[ \t]*=[ \t]*(?:''|"")[ \t]*\n(?P<for_indent>[ \t]*)for[ \t]+(?P<var>{IDENT})[ \t]+in[ \t]+(?P<iter>[^\n]+?):[ \t]*\n[ \t]+(?P<target>{IDENT})[ \t]*\+=[ \t]*(?P<item>{IDENT})(?:[ \t]*\+[ \t]*(?P<sep>'[^'\n]*'|"[^"\n]*"))?[ \t]*$"#
    ))
    .unwrap()
});

static MANUAL_SUM_LOOP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?m)^(?P<indent>[ \t]*)(?P<acc>{IDENT})[ \t]*=[ \t]*0(?:\.0)?[ \t]*\n(?P<for_indent>[ \t]*)for[ \t]+(?P<var>{IDENT})[ \t]+in[ \t]+(?P<iter>[^\n]+?):[ \t]*\n[ \t]+(?P<target>{IDENT})[ \t]*\+=[ \t]*(?P<item>{IDENT})[ \t]*$"
    ))
    .unwrap()
});

static REDUNDANT_ASSIGN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^[ \t]*(?P<lhs>{IDENT})[ \t]*=[ \t]*(?P<rhs>{IDENT})[ \t]*(?:[+-][ \t]*0|\*[ \t]*1)[ \t]*;?[ \t]*$"
    ))
    .unwrap()
});

static REDUNDANT_AUGMENTED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^[ \t]*{IDENT}[ \t]*(?:[+-]=[ \t]*0|\*=[ \t]*1)[ \t]*;?[ \t]*$"
    ))
    .unwrap()
});

static LIST_MEMBERSHIP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^(?P<head>[ \t]*(?:if|elif|while)\b[^\n]*?\bin[ \t]+)\[(?P<items>[^\[\]{}\n]+)\]")
        .unwrap()
});

static NESTED_CONVERSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?P<outer>list|tuple|set|str|int|float|dict|sorted)\([ \t]*(?P<inner>list|tuple|set|str|int|float|dict|sorted)\((?P<arg>[^()\n]*)\)[ \t]*\)",
    )
    .unwrap()
});

/// The built-in transformation handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinRewrite {
    ReplaceNestedLoops,
    UseListComprehension,
    RemoveRedundantCode,
    ReplaceDataStructures,
    ReplaceStringConcatenation,
    ReplaceManualSum,
    UseSetForUniqueness,
    RemoveRedundantConversion,
    UseConditionalComprehension,
    NoOp,
}

impl BuiltinRewrite {
    /// The reference action space, in order
    pub const DEFAULT_ACTIONS: [BuiltinRewrite; 9] = [
        BuiltinRewrite::ReplaceNestedLoops,
        BuiltinRewrite::UseListComprehension,
        BuiltinRewrite::RemoveRedundantCode,
        BuiltinRewrite::ReplaceDataStructures,
        BuiltinRewrite::ReplaceStringConcatenation,
        BuiltinRewrite::ReplaceManualSum,
        BuiltinRewrite::UseSetForUniqueness,
        BuiltinRewrite::RemoveRedundantConversion,
        BuiltinRewrite::UseConditionalComprehension,
    ];

    const ALL: [BuiltinRewrite; 10] = [
        BuiltinRewrite::ReplaceNestedLoops,
        BuiltinRewrite::UseListComprehension,
        BuiltinRewrite::RemoveRedundantCode,
        BuiltinRewrite::ReplaceDataStructures,
        BuiltinRewrite::ReplaceStringConcatenation,
        BuiltinRewrite::ReplaceManualSum,
        BuiltinRewrite::UseSetForUniqueness,
        BuiltinRewrite::RemoveRedundantConversion,
        BuiltinRewrite::UseConditionalComprehension,
        BuiltinRewrite::NoOp,
    ];

    /// Action identifier used in configuration and suggestions
    pub fn name(self) -> &'static str {
        match self {
            BuiltinRewrite::ReplaceNestedLoops => "replace_nested_loops",
            BuiltinRewrite::UseListComprehension => "use_list_comprehension",
            BuiltinRewrite::RemoveRedundantCode => "remove_redundant_code",
            BuiltinRewrite::ReplaceDataStructures => "replace_data_structures",
            BuiltinRewrite::ReplaceStringConcatenation => "replace_string_concatenation",
            BuiltinRewrite::ReplaceManualSum => "replace_manual_sum",
            BuiltinRewrite::UseSetForUniqueness => "use_set_for_uniqueness",
            BuiltinRewrite::RemoveRedundantConversion => "remove_redundant_conversion",
            BuiltinRewrite::UseConditionalComprehension => "use_conditional_comprehension",
            BuiltinRewrite::NoOp => "no_op",
        }
    }

    /// Resolve a configured action name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|rewrite| rewrite.name() == name)
    }

    /// Human readable description of the pattern this handler targets
    pub fn hint(self) -> &'static str {
        match self {
            BuiltinRewrite::ReplaceNestedLoops => {
                "Nested loops building a list: a flat comprehension avoids repeated append calls"
            }
            BuiltinRewrite::UseListComprehension => {
                "Single loop building a list: consider a list comprehension"
            }
            BuiltinRewrite::RemoveRedundantCode => "Redundant arithmetic statement detected",
            BuiltinRewrite::ReplaceDataStructures => {
                "Membership test against a list literal: a set literal gives constant-time lookup"
            }
            BuiltinRewrite::ReplaceStringConcatenation => {
                "String concatenation inside a loop: use str.join"
            }
            BuiltinRewrite::ReplaceManualSum => "Manual summation loop: use the built-in sum()",
            BuiltinRewrite::UseSetForUniqueness => {
                "Uniqueness check against a list: use a set"
            }
            BuiltinRewrite::RemoveRedundantConversion => "Nested redundant type conversion",
            BuiltinRewrite::UseConditionalComprehension => {
                "Filtered loop building a list: consider a conditional comprehension"
            }
            BuiltinRewrite::NoOp => "Leaves the code unchanged",
        }
    }

    /// Apply the handler, returning None when its precondition does not match
    pub fn apply(self, code: &str) -> Option<String> {
        match self {
            BuiltinRewrite::ReplaceNestedLoops => replace_nested_loops(code),
            BuiltinRewrite::UseListComprehension => use_list_comprehension(code),
            BuiltinRewrite::RemoveRedundantCode => remove_redundant_code(code),
            BuiltinRewrite::ReplaceDataStructures => replace_data_structures(code),
            BuiltinRewrite::ReplaceStringConcatenation => replace_string_concatenation(code),
            BuiltinRewrite::ReplaceManualSum => replace_manual_sum(code),
            BuiltinRewrite::UseSetForUniqueness => use_set_for_uniqueness(code),
            BuiltinRewrite::RemoveRedundantConversion => remove_redundant_conversion(code),
            BuiltinRewrite::UseConditionalComprehension => use_conditional_comprehension(code),
            BuiltinRewrite::NoOp => None,
        }
    }
}

impl fmt::Display for BuiltinRewrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Transformation for BuiltinRewrite {
    fn name(&self) -> &str {
        BuiltinRewrite::name(*self)
    }

    fn rewrite(&self, code: &str) -> EngineResult<Option<String>> {
        Ok(self.apply(code))
    }

    /// The pattern handlers only recognise Python; `no_op` fits anything
    fn supports(&self, language: &str) -> bool {
        *self == BuiltinRewrite::NoOp || language.eq_ignore_ascii_case(PYTHON)
    }
}

fn indent_width(line: &str) -> usize {
    line.chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

/// True if `ident` appears as a whole identifier inside `text`
fn mentions(text: &str, ident: &str) -> bool {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .any(|token| token == ident)
}

/// True when the first non-blank line after byte `end` is no deeper than
/// `base_indent`, i.e. the loop ending at `end` has no further body lines
fn block_ends_after(code: &str, end: usize, base_indent: &str) -> bool {
    code[end..]
        .split('\n')
        .skip(1)
        .find(|line| !line.trim().is_empty())
        .map_or(true, |line| indent_width(line) <= indent_width(base_indent))
}

/// Rewrites every match accepted by `render`; None if none was accepted
fn rewrite_matches<F>(pattern: &Regex, code: &str, mut render: F) -> Option<String>
where
    F: FnMut(&Captures<'_>, usize) -> Option<String>,
{
    let mut output = String::with_capacity(code.len());
    let mut last = 0;
    let mut changed = false;

    for caps in pattern.captures_iter(code) {
        let Some(whole) = caps.get(0) else { continue };
        if let Some(replacement) = render(&caps, whole.end()) {
            output.push_str(&code[last..whole.start()]);
            output.push_str(&replacement);
            last = whole.end();
            changed = true;
        }
    }

    if !changed {
        return None;
    }
    output.push_str(&code[last..]);
    Some(output)
}

/// Common guards for `acc = []` + loop patterns: same block, same
/// accumulator, and the loop body ends with the matched statement
fn list_loop_accepted(code: &str, caps: &Captures<'_>, end: usize) -> bool {
    caps["indent"] == caps["for_indent"]
        && caps["acc"] == caps["target"]
        && block_ends_after(code, end, &caps["for_indent"])
}

pub fn replace_nested_loops(code: &str) -> Option<String> {
    rewrite_matches(&NESTED_LOOPS, code, |caps, end| {
        if !list_loop_accepted(code, caps, end) || mentions(&caps["expr"], &caps["acc"]) {
            return None;
        }
        Some(format!(
            "{}{} = [{} for {} in {} for {} in {}]",
            &caps["indent"],
            &caps["acc"],
            caps["expr"].trim(),
            &caps["var"],
            caps["iter"].trim(),
            &caps["inner_var"],
            caps["inner_iter"].trim()
        ))
    })
}

pub fn use_list_comprehension(code: &str) -> Option<String> {
    rewrite_matches(&APPEND_LOOP, code, |caps, end| {
        if !list_loop_accepted(code, caps, end) || mentions(&caps["expr"], &caps["acc"]) {
            return None;
        }
        Some(format!(
            "{}{} = [{} for {} in {}]",
            &caps["indent"],
            &caps["acc"],
            caps["expr"].trim(),
            &caps["var"],
            caps["iter"].trim()
        ))
    })
}

pub fn use_conditional_comprehension(code: &str) -> Option<String> {
    rewrite_matches(&CONDITIONAL_APPEND_LOOP, code, |caps, end| {
        let acc = &caps["acc"];
        // Conditions that read the list being built are order dependent
        if !list_loop_accepted(code, caps, end)
            || mentions(&caps["cond"], acc)
            || mentions(&caps["expr"], acc)
        {
            return None;
        }
        Some(format!(
            "{}{} = [{} for {} in {} if {}]",
            &caps["indent"],
            acc,
            caps["expr"].trim(),
            &caps["var"],
            caps["iter"].trim(),
            caps["cond"].trim()
        ))
    })
}

pub fn use_set_for_uniqueness(code: &str) -> Option<String> {
    rewrite_matches(&UNIQUE_APPEND_LOOP, code, |caps, end| {
        let var = &caps["var"];
        if !list_loop_accepted(code, caps, end)
            || caps["seen"] != caps["acc"]
            || &caps["item"] != var
            || &caps["appended"] != var
        {
            return None;
        }
        Some(format!(
            "{}{} = list(set({}))",
            &caps["indent"],
            &caps["acc"],
            caps["iter"].trim()
        ))
    })
}

pub fn replace_string_concatenation(code: &str) -> Option<String> {
    rewrite_matches(&STRING_CONCAT_LOOP, code, |caps, end| {
        if !list_loop_accepted(code, caps, end) || caps["item"] != caps["var"] {
            return None;
        }
        let iter = caps["iter"].trim();
        let rewritten = match caps.name("sep") {
            Some(sep) => format!("{0}.join({1}) + {0}", sep.as_str(), iter),
            None => format!("''.join({})", iter),
        };
        Some(format!("{}{} = {}", &caps["indent"], &caps["acc"], rewritten))
    })
}

pub fn replace_manual_sum(code: &str) -> Option<String> {
    rewrite_matches(&MANUAL_SUM_LOOP, code, |caps, end| {
        if !list_loop_accepted(code, caps, end) || caps["item"] != caps["var"] {
            return None;
        }
        Some(format!(
            "{}{} = sum({})",
            &caps["indent"],
            &caps["acc"],
            caps["iter"].trim()
        ))
    })
}

fn is_redundant_statement(line: &str) -> bool {
    if REDUNDANT_AUGMENTED.is_match(line) {
        return true;
    }
    REDUNDANT_ASSIGN
        .captures(line)
        .is_some_and(|caps| caps["lhs"] == caps["rhs"])
}

/// Drops `x = x + 0`-style statements. A statement that is the whole body
/// of a block becomes `pass` so the block stays well formed.
pub fn remove_redundant_code(code: &str) -> Option<String> {
    let lines: Vec<&str> = code.split('\n').collect();
    let mut kept: Vec<String> = Vec::with_capacity(lines.len());
    let mut changed = false;

    for (index, line) in lines.iter().enumerate() {
        if !is_redundant_statement(line) {
            kept.push((*line).to_string());
            continue;
        }
        changed = true;

        let opens_block = kept
            .iter()
            .rev()
            .find(|l| !l.trim().is_empty())
            .filter(|l| l.trim_end().ends_with(':'));
        let body_continues = lines[index + 1..]
            .iter()
            .find(|l| !l.trim().is_empty())
            .is_some_and(|next| indent_width(next) >= indent_width(line));

        if let Some(header) = opens_block {
            if indent_width(line) > indent_width(header) && !body_continues {
                let indent: String = line.chars().take_while(|c| c.is_whitespace()).collect();
                kept.push(format!("{}pass", indent));
            }
        }
    }

    changed.then(|| kept.join("\n"))
}

pub fn replace_data_structures(code: &str) -> Option<String> {
    rewrite_matches(&LIST_MEMBERSHIP, code, |caps, _| {
        Some(format!("{}{{{}}}", &caps["head"], &caps["items"]))
    })
}

pub fn remove_redundant_conversion(code: &str) -> Option<String> {
    rewrite_matches(&NESTED_CONVERSION, code, |caps, _| {
        let outer = &caps["outer"];
        let inner = &caps["inner"];
        let arg = caps["arg"].trim();

        match (outer, inner) {
            ("sorted", "list") | ("sorted", "tuple") | ("list", "sorted") => {
                Some(format!("sorted({})", arg))
            }
            ("sorted", "sorted") => None,
            _ if outer == inner => Some(format!("{}({})", outer, arg)),
            _ => None,
        }
    })
}
