use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::Result;

/// Ordered column filter.
///
/// Scalar values travel as their plain string form; arrays and objects are
/// sent as JSON text so structured operators such as `{"gte": 18}` fit in a
/// flat query string.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter(Vec<(String, JsonValue)>);

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a filter from `(column, value)` pairs, keeping their order.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<JsonValue>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(column, value)| (column.into(), value.into()))
                .collect(),
        )
    }

    /// Appends a condition. A repeated column replaces the earlier value in place.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        let column = column.into();
        let value = value.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == column) {
            Some(slot) => slot.1 = value,
            None => self.0.push((column, value)),
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &JsonValue)> {
        self.0.iter().map(|(column, value)| (column.as_str(), value))
    }
}

impl<K: Into<String>, V: Into<JsonValue>> FromIterator<(K, V)> for Filter {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_pairs(iter)
    }
}

impl From<()> for Filter {
    fn from(_: ()) -> Self {
        Self::default()
    }
}

impl<K: Into<String>, V: Into<JsonValue>, const N: usize> From<[(K, V); N]> for Filter {
    fn from(pairs: [(K, V); N]) -> Self {
        Self::from_pairs(pairs)
    }
}

/// Query-string parameters in insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push((key.into(), value.into()));
    }

    /// Pushes a comma-joined list; empty lists are skipped.
    pub fn push_list<S: AsRef<str>>(&mut self, key: &str, values: &[S]) {
        if values.is_empty() {
            return;
        }
        let joined = values
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(",");
        self.push(key, joined);
    }

    pub fn push_opt<V: ToString>(&mut self, key: &str, value: Option<V>) {
        if let Some(value) = value {
            self.push(key, value.to_string());
        }
    }

    /// Pushes one parameter per filter column.
    pub fn push_filter(&mut self, filter: &Filter) {
        for (column, value) in filter.iter() {
            self.push(column, filter_value_to_param(value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.0
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

/// Serializes a filter value for the query string.
pub(crate) fn filter_value_to_param(value: &JsonValue) -> String {
    match value {
        JsonValue::String(text) => text.clone(),
        // Numbers, booleans and null share their JSON text form; arrays and
        // objects are compact JSON.
        other => other.to_string(),
    }
}

/// Kind of a JOIN clause.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Outer,
}

/// JOIN clause for a table query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct JoinClause {
    #[serde(rename = "type")]
    pub kind: JoinKind,
    pub table: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub condition: String,
}

impl JoinClause {
    pub fn new(kind: JoinKind, table: impl Into<String>, condition: impl Into<String>) -> Self {
        Self {
            kind,
            table: table.into(),
            alias: None,
            condition: condition.into(),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

/// Options for [`crate::MetaBaseClient::query`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryOptions {
    pub select: Vec<String>,
    pub filter: Filter,
    pub order: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub joins: Vec<JoinClause>,
    pub group_by: Vec<String>,
    pub having: Filter,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn filter(mut self, filter: impl Into<Filter>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Adds one `where` condition: a plain value for equality, or an
    /// operator object such as `{"gte": 18}`.
    pub fn condition(mut self, column: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.filter = self.filter.with(column, value);
        self
    }

    pub fn order(mut self, order: impl Into<String>) -> Self {
        self.order = Some(order.into());
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn join(mut self, join: JoinClause) -> Self {
        self.joins.push(join);
        self
    }

    pub fn group_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_by = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn having(mut self, having: impl Into<Filter>) -> Self {
        self.having = having.into();
        self
    }

    pub(crate) fn to_params(&self) -> Result<QueryParams> {
        let mut params = QueryParams::new();
        params.push_list("select", &self.select);
        params.push_filter(&self.filter);
        params.push_opt("order", self.order.as_deref());
        params.push_opt("limit", self.limit);
        params.push_opt("offset", self.offset);
        if !self.joins.is_empty() {
            params.push("joins", serde_json::to_string(&self.joins)?);
        }
        params.push_list("group_by", &self.group_by);
        if !self.having.is_empty() {
            let having: serde_json::Map<String, JsonValue> = self
                .having
                .iter()
                .map(|(column, value)| (column.to_owned(), value.clone()))
                .collect();
            params.push("having", JsonValue::Object(having).to_string());
        }
        Ok(params)
    }
}

/// Options for insert calls.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InsertOptions {
    /// Columns the server should echo back.
    pub returning: Vec<String>,
}

/// Options for update and delete calls.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Columns the server should echo back.
    pub returning: Vec<String>,
}

impl InsertOptions {
    pub fn returning<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            returning: columns.into_iter().map(Into::into).collect(),
        }
    }
}

impl UpdateOptions {
    pub fn returning<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            returning: columns.into_iter().map(Into::into).collect(),
        }
    }
}

pub(crate) fn push_returning(params: &mut QueryParams, returning: Option<&[String]>) {
    if let Some(columns) = returning {
        params.push_list("returning", columns);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::{Filter, JoinClause, JoinKind, QueryOptions, QueryParams};

    use super::filter_value_to_param;

    #[test]
    fn scalar_values_use_plain_string_form() {
        assert_eq!(filter_value_to_param(&json!("kit")), "kit");
        assert_eq!(filter_value_to_param(&json!(18)), "18");
        assert_eq!(filter_value_to_param(&json!(1.5)), "1.5");
        assert_eq!(filter_value_to_param(&json!(true)), "true");
        assert_eq!(filter_value_to_param(&json!(null)), "null");
    }

    #[test]
    fn compound_values_become_json_text() {
        assert_eq!(filter_value_to_param(&json!({"gte": 18})), r#"{"gte":18}"#);
        assert_eq!(filter_value_to_param(&json!([1, 2])), "[1,2]");
    }

    #[test]
    fn query_options_serialize_in_order() {
        let params = QueryOptions::new()
            .select(["id", "name"])
            .condition("age", json!({"gte": 18}))
            .limit(10)
            .to_params()
            .expect("must serialize");

        assert_eq!(
            params.pairs(),
            &[
                ("select".to_owned(), "id,name".to_owned()),
                ("age".to_owned(), r#"{"gte":18}"#.to_owned()),
                ("limit".to_owned(), "10".to_owned()),
            ]
        );
    }

    #[test]
    fn empty_options_produce_no_params() {
        let params = QueryOptions::default().to_params().expect("must serialize");
        assert!(params.is_empty());
    }

    #[test]
    fn joins_group_by_and_having_are_encoded() {
        let params = QueryOptions::new()
            .join(JoinClause::new(JoinKind::Left, "orders", "orders.user_id = users.id").with_alias("o"))
            .group_by(["users.id", "users.name"])
            .having([("count", json!({"gt": 1}))])
            .to_params()
            .expect("must serialize");

        assert_eq!(
            params.get("joins"),
            Some(r#"[{"type":"left","table":"orders","alias":"o","condition":"orders.user_id = users.id"}]"#)
        );
        assert_eq!(params.get("group_by"), Some("users.id,users.name"));
        assert_eq!(params.get("having"), Some(r#"{"count":{"gt":1}}"#));
    }

    #[test]
    fn filter_with_replaces_repeated_column() {
        let filter = Filter::new().with("a", 1).with("b", 2).with("a", 3);
        let pairs: Vec<_> = filter.iter().map(|(k, v)| (k.to_owned(), v.clone())).collect();
        assert_eq!(pairs, vec![("a".to_owned(), json!(3)), ("b".to_owned(), json!(2))]);
    }

    #[test]
    fn push_list_skips_empty() {
        let mut params = QueryParams::new();
        params.push_list::<String>("returning", &[]);
        assert!(params.is_empty());
    }
}
