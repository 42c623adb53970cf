//! Rulesets and the runtime data they are matched against.
//!
//! A ruleset holds an `if` block and an `unless` block. Each block lists
//! patterns per subject (branch, event, path, ...). Patterns are compared with
//! the configured [`Matcher`] and the per-subject results are combined with the
//! configured [`Operator`].

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

use crate::de::one_or_many;
use crate::{Error, Result};

/// How patterns are compared to rule data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Matcher {
    /// Shell-style globs; `*` stops at `/`, `**` does not.
    #[default]
    Filepath,
    #[serde(alias = "regex")]
    Regexp,
}

/// How per-subject results are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    #[default]
    And,
    Or,
}

/// Runtime context for rule evaluation. Built once per compile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleData {
    pub branch: String,
    /// `event` or `event:action`.
    pub event: String,
    /// Files changed by the triggering commit(s).
    pub path: Vec<String>,
    pub label: Vec<String>,
    pub repo: String,
    pub sender: String,
    pub status: String,
    pub tag: String,
    pub target: String,
    pub instance: String,
}

/// Patterns per subject. An empty list places no constraint on its subject.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rules {
    #[serde(skip_serializing_if = "Vec::is_empty", deserialize_with = "one_or_many")]
    pub branch: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", deserialize_with = "events")]
    pub event: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", deserialize_with = "one_or_many")]
    pub path: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", deserialize_with = "one_or_many")]
    pub label: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", deserialize_with = "one_or_many")]
    pub repo: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", deserialize_with = "one_or_many")]
    pub sender: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", deserialize_with = "one_or_many")]
    pub status: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", deserialize_with = "one_or_many")]
    pub tag: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", deserialize_with = "one_or_many")]
    pub target: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", deserialize_with = "one_or_many")]
    pub instance: Vec<String>,
}

/// Events written without an action stand for their default actions.
fn expand_event(event: &str) -> &'static [&'static str] {
    match event {
        "pull_request" => &[
            "pull_request:opened",
            "pull_request:synchronize",
            "pull_request:reopened",
        ],
        "deployment" => &["deployment:created"],
        "comment" => &["comment:created", "comment:edited"],
        _ => &[],
    }
}

fn events<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let mut expanded: Vec<String> = Vec::new();
    for event in one_or_many(deserializer)? {
        push_unique(&mut expanded, &event);
        for action in expand_event(&event) {
            push_unique(&mut expanded, action);
        }
    }
    Ok(expanded)
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|x| x == value) {
        list.push(value.to_string());
    }
}

enum Subject<'a> {
    One(&'a str),
    Many(&'a [String]),
}

impl Rules {
    pub fn is_empty(&self) -> bool {
        self.branch.is_empty()
            && self.event.is_empty()
            && self.path.is_empty()
            && self.label.is_empty()
            && self.repo.is_empty()
            && self.sender.is_empty()
            && self.status.is_empty()
            && self.tag.is_empty()
            && self.target.is_empty()
            && self.instance.is_empty()
    }

    /// Evaluate the constrained subjects against `data`.
    ///
    /// Status rules are only considered when the data carries a status; at
    /// compile time it usually does not and status is decided by the executor.
    pub fn matches(&self, data: &RuleData, matcher: Matcher, operator: Operator) -> Result<bool> {
        let mut checks: Vec<(&[String], Subject<'_>)> = vec![
            (self.branch.as_slice(), Subject::One(&data.branch)),
            (self.event.as_slice(), Subject::One(&data.event)),
            (self.path.as_slice(), Subject::Many(&data.path)),
            (self.label.as_slice(), Subject::Many(&data.label)),
            (self.repo.as_slice(), Subject::One(&data.repo)),
            (self.sender.as_slice(), Subject::One(&data.sender)),
            (self.tag.as_slice(), Subject::One(&data.tag)),
            (self.target.as_slice(), Subject::One(&data.target)),
            (self.instance.as_slice(), Subject::One(&data.instance)),
        ];
        if !data.status.is_empty() {
            checks.push((self.status.as_slice(), Subject::One(&data.status)));
        }

        let mut evaluated = false;
        for (patterns, subject) in checks {
            if patterns.is_empty() {
                continue;
            }
            evaluated = true;
            let matched = match subject {
                Subject::One(value) => any_match(patterns, value, matcher)?,
                Subject::Many(values) => {
                    let mut hit = false;
                    for value in values {
                        if any_match(patterns, value, matcher)? {
                            hit = true;
                            break;
                        }
                    }
                    hit
                }
            };
            match operator {
                Operator::And if !matched => return Ok(false),
                Operator::Or if matched => return Ok(true),
                _ => {}
            }
        }

        Ok(match operator {
            Operator::And => true,
            Operator::Or => !evaluated,
        })
    }
}

fn any_match(patterns: &[String], value: &str, matcher: Matcher) -> Result<bool> {
    for pattern in patterns {
        let hit = match matcher {
            Matcher::Filepath => glob_regex(pattern)?.is_match(value),
            Matcher::Regexp => Regex::new(pattern)
                .map_err(|e| Error::InvalidPattern {
                    pattern: pattern.clone(),
                    message: e.to_string(),
                })?
                .is_match(value),
        };
        if hit {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Translate a shell glob into an anchored regular expression.
fn glob_regex(pattern: &str) -> Result<Regex> {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('^');
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                out.push_str(".*");
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            '[' => {
                out.push('[');
                if chars.peek() == Some(&'!') || chars.peek() == Some(&'^') {
                    chars.next();
                    out.push('^');
                }
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == ']' {
                        closed = true;
                        break;
                    }
                    if c == '\\' || c == '[' {
                        out.push('\\');
                    }
                    out.push(c);
                }
                if !closed {
                    return Err(Error::InvalidPattern {
                        pattern: pattern.to_string(),
                        message: "unterminated character class".to_string(),
                    });
                }
                out.push(']');
            }
            '\\' => {
                if let Some(escaped) = chars.next() {
                    out.push_str(&regex::escape(&escaped.to_string()));
                }
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    Regex::new(&out).map_err(|e| Error::InvalidPattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

/// Conditions deciding whether a unit of work survives purging.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Ruleset {
    #[serde(rename = "if", skip_serializing_if = "Rules::is_empty")]
    pub if_rules: Rules,
    #[serde(skip_serializing_if = "Rules::is_empty")]
    pub unless: Rules,
    pub matcher: Matcher,
    pub operator: Operator,
    /// Keep running later steps when this one fails.
    #[serde(rename = "continue", skip_serializing_if = "std::ops::Not::not")]
    pub continue_on_failure: bool,
}

impl<'de> Deserialize<'de> for Ruleset {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Rule fields written directly under `ruleset:` form the `if` block.
        #[derive(Default, Deserialize)]
        #[serde(default)]
        struct Raw {
            #[serde(rename = "if")]
            if_rules: Option<Rules>,
            unless: Rules,
            matcher: Matcher,
            operator: Operator,
            #[serde(rename = "continue")]
            continue_on_failure: bool,
            #[serde(flatten)]
            shorthand: Rules,
        }

        let raw = Option::<Raw>::deserialize(deserializer)?.unwrap_or_default();
        Ok(Ruleset {
            if_rules: raw.if_rules.unwrap_or(raw.shorthand),
            unless: raw.unless,
            matcher: raw.matcher,
            operator: raw.operator,
            continue_on_failure: raw.continue_on_failure,
        })
    }
}

impl Ruleset {
    pub fn is_empty(&self) -> bool {
        self.if_rules.is_empty() && self.unless.is_empty() && !self.continue_on_failure
    }

    /// Decide whether a unit guarded by this ruleset should run.
    pub fn matches(&self, data: &RuleData) -> Result<bool> {
        if self.if_rules.is_empty() && self.unless.is_empty() {
            return Ok(true);
        }
        if !self.unless.is_empty() && self.unless.matches(data, self.matcher, self.operator)? {
            return Ok(false);
        }
        if self.if_rules.is_empty() {
            return Ok(true);
        }
        self.if_rules.matches(data, self.matcher, self.operator)
    }
}
