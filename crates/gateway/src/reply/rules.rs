// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Manual rule matching. Rules arrive pre-sorted (priority descending,
//! id ascending); evaluation is case-insensitive except for regex rules,
//! which match the raw text.

use regex::Regex;

use crate::model::{MatchMode, RuleRow};

/// First matching rule wins.
pub fn first_match<'a>(rules: &'a [RuleRow], text: &str) -> Option<&'a RuleRow> {
    rules.iter().filter(|r| r.is_active).find(|r| matches(r, text))
}

fn matches(rule: &RuleRow, text: &str) -> bool {
    match rule.match_mode {
        MatchMode::Regex => Regex::new(&rule.pattern).map(|re| re.is_match(text)).unwrap_or(false),
        mode => {
            let text = text.trim().to_lowercase();
            let pattern = rule.pattern.trim().to_lowercase();
            match mode {
                MatchMode::Exact => text == pattern,
                MatchMode::Contains => text.contains(&pattern),
                MatchMode::StartsWith => text.starts_with(&pattern),
                MatchMode::EndsWith => text.ends_with(&pattern),
                MatchMode::Regex => false,
            }
        }
    }
}

#[cfg(test)]
#[path = "rules_tests.rs"]
mod tests;
