//! ADO-style connection string parsing (`Server=db1;Database=Orders;...`).
//!
//! Only the handful of keywords snap needs are surfaced as typed accessors;
//! everything else stays available through [`ConnectionString::get`].

use std::collections::BTreeMap;

use crate::error::{Result, SnapError};

const SERVER_KEYS: &[&str] = &[
    "server",
    "data source",
    "address",
    "addr",
    "network address",
];
const CATALOG_KEYS: &[&str] = &["database", "initial catalog"];
const USER_KEYS: &[&str] = &["user id", "uid", "user"];
const PASSWORD_KEYS: &[&str] = &["password", "pwd"];
const INTEGRATED_KEYS: &[&str] = &["integrated security", "trusted_connection"];

/// Parsed connection string with case-insensitive keywords.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionString {
    values: BTreeMap<String, String>,
}

impl ConnectionString {
    /// Parse `key=value` pairs separated by `;`.
    ///
    /// Values may be wrapped in single or double quotes to carry `;`; a
    /// doubled quote inside a quoted value is a literal quote.
    pub fn parse(input: &str) -> Result<Self> {
        let mut values = BTreeMap::new();
        let mut chars = input.chars().peekable();

        loop {
            while chars.peek().is_some_and(|c| c.is_whitespace() || *c == ';') {
                chars.next();
            }
            if chars.peek().is_none() {
                break;
            }

            let mut key = String::new();
            for c in chars.by_ref() {
                if c == '=' {
                    break;
                }
                if c == ';' {
                    return Err(SnapError::config(format!(
                        "Connection string keyword '{}' has no value",
                        key.trim()
                    )));
                }
                key.push(c);
            }
            let key = key.trim().to_lowercase();
            if key.is_empty() {
                return Err(SnapError::config("Connection string has an empty keyword"));
            }

            while chars.peek().is_some_and(|c| c.is_whitespace()) {
                chars.next();
            }

            let mut value = String::new();
            match chars.peek().copied() {
                Some(quote @ ('\'' | '"')) => {
                    chars.next();
                    let mut closed = false;
                    while let Some(c) = chars.next() {
                        if c == quote {
                            if chars.peek() == Some(&quote) {
                                chars.next();
                                value.push(quote);
                                continue;
                            }
                            closed = true;
                            break;
                        }
                        value.push(c);
                    }
                    if !closed {
                        return Err(SnapError::config(format!(
                            "Unterminated quoted value for connection string keyword '{}'",
                            key
                        )));
                    }
                    for c in chars.by_ref() {
                        if c == ';' {
                            break;
                        }
                    }
                }
                _ => {
                    for c in chars.by_ref() {
                        if c == ';' {
                            break;
                        }
                        value.push(c);
                    }
                    value = value.trim().to_string();
                }
            }

            values.insert(key, value);
        }

        Ok(Self { values })
    }

    /// Raw keyword lookup, case-insensitive.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(&key.to_lowercase()).map(String::as_str)
    }

    fn first_of(&self, synonyms: &[&str]) -> Option<&str> {
        synonyms
            .iter()
            .find_map(|k| self.values.get(*k))
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Server address (`Server`, `Data Source`, ...)
    pub fn data_source(&self) -> Option<&str> {
        self.first_of(SERVER_KEYS)
    }

    /// Database name (`Database`, `Initial Catalog`)
    pub fn initial_catalog(&self) -> Option<&str> {
        self.first_of(CATALOG_KEYS)
    }

    pub fn user_id(&self) -> Option<&str> {
        self.first_of(USER_KEYS)
    }

    pub fn password(&self) -> Option<&str> {
        self.first_of(PASSWORD_KEYS)
    }

    /// `Integrated Security=true|sspi|yes`
    pub fn integrated_security(&self) -> bool {
        self.first_of(INTEGRATED_KEYS)
            .map(|v| matches!(v.to_lowercase().as_str(), "true" | "sspi" | "yes"))
            .unwrap_or(false)
    }
}
