//! Short display id allocation for projects and saved lists.
//!
//! A short id is 1-4 lowercase alphanumerics derived from the entity name.
//! Candidates are tried in a fixed order: the literal prefix, then a 3-char
//! prefix plus one letter, then a 2-char prefix plus two letters.

use crate::error::ToolError;
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};

const MAX_LEN: usize = 4;
const FALLBACK_BASE: &str = "x";

/// Tables that own a short-id namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Projects,
    Lists,
}

impl Namespace {
    fn table(&self) -> &'static str {
        match self {
            Namespace::Projects => "projects",
            Namespace::Lists => "saved_lists",
        }
    }
}

/// Lowercase alphanumeric base derived from a name.
fn base_of(name: &str) -> String {
    let base: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if base.is_empty() {
        FALLBACK_BASE.to_string()
    } else {
        base
    }
}

fn prefix(base: &str, n: usize) -> &str {
    &base[..base.len().min(n)]
}

/// All candidates for `name`, in probing order.
pub fn candidates(name: &str) -> impl Iterator<Item = String> {
    let base = base_of(name);
    let literal = prefix(&base, MAX_LEN).to_string();
    let three = prefix(&base, 3).to_string();
    let two = prefix(&base, 2).to_string();

    let one_letter = ('a'..='z').map(move |c| format!("{three}{c}"));
    let two_letters = ('a'..='z')
        .flat_map(|c1| ('a'..='z').map(move |c2| (c1, c2)))
        .map(move |(c1, c2)| format!("{two}{c1}{c2}"));

    std::iter::once(literal).chain(one_letter).chain(two_letters)
}

/// Pick the first free candidate in `namespace`.
///
/// Must run on the same connection (and transaction) as the insert that uses
/// the id.
pub fn allocate(conn: &Connection, namespace: Namespace, name: &str) -> Result<String> {
    let sql = format!("SELECT 1 FROM {} WHERE short_id = ?1", namespace.table());
    let mut stmt = conn.prepare(&sql)?;
    for candidate in candidates(name) {
        let taken = stmt
            .query_row(params![&candidate], |_| Ok(()))
            .optional()?
            .is_some();
        if !taken {
            return Ok(candidate);
        }
    }
    Err(ToolError::short_id_exhausted(name).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_order() {
        let all: Vec<String> = candidates("Alpha2").collect();
        assert_eq!(all[0], "alph");
        assert_eq!(all[1], "alpa");
        assert_eq!(all[26], "alpz");
        assert_eq!(all[27], "alaa");
        assert_eq!(all.last().map(String::as_str), Some("alzz"));
        assert_eq!(all.len(), 1 + 26 + 26 * 26);
    }

    #[test]
    fn short_and_symbolic_names() {
        assert_eq!(candidates("Go!").next().unwrap(), "go");
        assert_eq!(candidates("A").nth(1).unwrap(), "aa");
        assert_eq!(candidates("!!!").next().unwrap(), "x");
        assert_eq!(candidates("Home Stuff").next().unwrap(), "home");
    }

    #[test]
    fn candidates_are_short_lowercase_alphanumerics() {
        for c in candidates("Über Project 42") {
            assert!((1..=4).contains(&c.len()));
            assert!(c.chars().all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit()));
        }
    }
}
