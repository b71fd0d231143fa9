//! Execution parameters supplied to `apply`.

use std::collections::BTreeMap;

/// Suffix marking a query key whose values are collected into a list.
pub const LIST_SUFFIX: &str = "[]";

/// A single parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Single(String),
    List(Vec<String>),
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Single(value)
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(values: Vec<String>) -> Self {
        Self::List(values)
    }
}

/// Mapping from parameter names to values, used as the template root context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parameters(BTreeMap<String, ParamValue>);

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    /// Bind decoded query pairs.
    ///
    /// A key ending in `[]` collects every value given for it into a list
    /// stored under the key without the suffix. Any other key keeps only its
    /// first value. When `k` and `k[]` are both present the one whose first
    /// occurrence comes later wins.
    pub fn from_query_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut order: Vec<String> = Vec::new();
        let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (key, value) in pairs {
            let key = key.as_ref();
            let values = grouped.entry(key.to_string()).or_insert_with(|| {
                order.push(key.to_string());
                Vec::new()
            });
            values.push(value.into());
        }

        let mut params = Self::new();
        for raw_key in order {
            let Some(mut values) = grouped.remove(&raw_key) else {
                continue;
            };
            match raw_key.strip_suffix(LIST_SUFFIX) {
                Some(list_key) => params.insert(list_key, ParamValue::List(values)),
                None => {
                    let first = values.swap_remove(0);
                    params.insert(raw_key, ParamValue::Single(first));
                }
            }
        }
        params
    }
}

impl<K: Into<String>, V: Into<ParamValue>> FromIterator<(K, V)> for Parameters {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut params = Self::new();
        for (key, value) in iter {
            params.insert(key, value);
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_keys_keep_first_value() {
        let params = Parameters::from_query_pairs([("Name", "World"), ("Name", "Moon")]);
        assert_eq!(params.get("Name"), Some(&ParamValue::from("World")));
    }

    #[test]
    fn bracket_keys_collect_lists() {
        let params = Parameters::from_query_pairs([
            ("Items[]", "a"),
            ("Title", "List"),
            ("Items[]", "b"),
        ]);
        assert_eq!(
            params.get("Items"),
            Some(&ParamValue::List(vec!["a".into(), "b".into()]))
        );
        assert_eq!(params.get("Items[]"), None);
        assert_eq!(params.get("Title"), Some(&ParamValue::from("List")));
    }

    #[test]
    fn later_key_form_wins_on_conflict() {
        let params = Parameters::from_query_pairs([("k", "one"), ("k[]", "x"), ("k[]", "y")]);
        assert_eq!(
            params.get("k"),
            Some(&ParamValue::List(vec!["x".into(), "y".into()]))
        );
    }

    #[test]
    fn empty_bracket_key_binds_empty_name() {
        let params = Parameters::from_query_pairs([("[]", "v")]);
        assert_eq!(params.get(""), Some(&ParamValue::List(vec!["v".into()])));
    }
}
