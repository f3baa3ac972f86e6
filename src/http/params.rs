//! Query parameter parsing.
//!
//! A parameter seen once is a scalar; a parameter seen more than once is an
//! ordered list. Callers match on [`ParamValue`] instead of probing types.

use std::collections::HashMap;

use serde::Serialize;

/// Value of one query parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Scalar(String),
    List(Vec<String>),
}

impl ParamValue {
    /// The scalar value, or the first list entry.
    pub fn first(&self) -> &str {
        match self {
            ParamValue::Scalar(s) => s,
            ParamValue::List(values) => values.first().map(String::as_str).unwrap_or(""),
        }
    }

    /// All values in order.
    pub fn values(&self) -> Vec<&str> {
        match self {
            ParamValue::Scalar(s) => vec![s.as_str()],
            ParamValue::List(values) => values.iter().map(String::as_str).collect(),
        }
    }

    fn push(self, value: String) -> Self {
        match self {
            ParamValue::Scalar(first) => ParamValue::List(vec![first, value]),
            ParamValue::List(mut values) => {
                values.push(value);
                ParamValue::List(values)
            }
        }
    }
}

/// Parse an `application/x-www-form-urlencoded` query string.
pub fn parse_query(query: &str) -> HashMap<String, ParamValue> {
    let mut params = HashMap::new();
    merge_form(&mut params, query.as_bytes());
    params
}

/// Add the fields of a urlencoded form to `params`, after those already there.
pub fn merge_form(params: &mut HashMap<String, ParamValue>, form: &[u8]) {
    for (key, value) in url::form_urlencoded::parse(form) {
        let key = key.into_owned();
        let value = value.into_owned();
        let next = match params.remove(&key) {
            Some(existing) => existing.push(value),
            None => ParamValue::Scalar(value),
        };
        params.insert(key, next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_params_become_lists() {
        let params = parse_query("a=1&a=2&b=3");
        assert_eq!(params["a"], ParamValue::List(vec!["1".into(), "2".into()]));
        assert_eq!(params["b"], ParamValue::Scalar("3".into()));
    }

    #[test]
    fn decodes_and_keeps_order() {
        let params = parse_query("q=hello+world&q=%C3%A9&q=3&empty=");
        assert_eq!(params["q"].values(), vec!["hello world", "é", "3"]);
        assert_eq!(params["q"].first(), "hello world");
        assert_eq!(params["empty"], ParamValue::Scalar(String::new()));
    }

    #[test]
    fn form_fields_follow_query_fields() {
        let mut params = parse_query("a=1&only=q");
        merge_form(&mut params, b"a=2&b=x+y");
        assert_eq!(params["a"].values(), vec!["1", "2"]);
        assert_eq!(params["b"], ParamValue::Scalar("x y".into()));
        assert_eq!(params["only"], ParamValue::Scalar("q".into()));
    }

    #[test]
    fn empty_query() {
        assert!(parse_query("").is_empty());
    }
}
