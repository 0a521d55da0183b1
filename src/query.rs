//! A minimal PathQuery: enough to select columns, constrain, outer-join, and
//! ship the query to a mine as XML.

use crate::constants::QUERY_PATH;
use crate::errors::{Error, ProtocolError};
use crate::results::{ResultIterator, Row, RowFormat};
use crate::types::View;
use crate::Service;
use itertools::Itertools;
use std::collections::BTreeSet;

/// Anything that can be run as a query.
pub trait Queryable: Send + Sync {
    fn to_query(&self) -> PathQuery;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pub path: String,
    pub op: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathQuery {
    model: String,
    root: String,
    views: Vec<String>,
    constraints: Vec<Constraint>,
    joins: BTreeSet<String>,
}

impl PathQuery {
    pub fn new(model: impl Into<String>, root: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            root: root.into(),
            views: Vec::new(),
            constraints: Vec::new(),
            joins: BTreeSet::new(),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    pub fn views(&self) -> &[String] {
        &self.views
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Paths may be given with or without the root class, i.e. `symbol` means `Gene.symbol`.
    fn qualify(&self, path: &str) -> String {
        if path == self.root || path.starts_with(&format!("{}.", self.root)) {
            path.to_string()
        } else {
            format!("{}.{}", self.root, path)
        }
    }

    /// Replace the output columns.
    pub fn select<S: AsRef<str>>(mut self, paths: impl IntoIterator<Item = S>) -> Self {
        self.views.clear();
        self.add_view(paths)
    }

    pub fn add_view<S: AsRef<str>>(mut self, paths: impl IntoIterator<Item = S>) -> Self {
        let paths: Vec<_> = paths.into_iter().map(|p| self.qualify(p.as_ref())).collect();
        self.views.extend(paths);
        self
    }

    pub fn constrain(mut self, path: &str, op: &str, value: impl ToString) -> Self {
        let constraint = Constraint {
            path: self.qualify(path),
            op: op.to_string(),
            value: value.to_string(),
        };
        self.constraints.push(constraint);
        self
    }

    pub fn outer_join(mut self, path: &str) -> Self {
        let path = self.qualify(path);
        self.joins.insert(path);
        self
    }

    pub fn view(&self) -> View {
        View(self.views.clone())
    }

    pub fn to_xml(&self) -> String {
        let mut xml = format!(
            "<query model=\"{}\" view=\"{}\">",
            escape(&self.model),
            escape(&self.views.join(" "))
        );
        for join in &self.joins {
            xml.push_str(&format!("<join path=\"{}\" style=\"OUTER\"/>", escape(join)));
        }
        for c in &self.constraints {
            xml.push_str(&format!(
                "<constraint path=\"{}\" op=\"{}\" value=\"{}\"/>",
                escape(&c.path),
                escape(&c.op),
                escape(&c.value)
            ));
        }
        xml.push_str("</query>");
        xml
    }

    pub fn to_query_params(&self) -> Vec<(String, String)> {
        vec![("query".to_string(), self.to_xml())]
    }

    /// A copy of this query selecting a single id column, as list uploads require.
    ///
    /// With no view the root class is selected. When every column belongs to
    /// the same class, that class is selected. Otherwise the view is left alone
    /// and the server decides.
    pub fn listable(&self) -> PathQuery {
        let mut q = self.clone();
        if q.views.is_empty() {
            q.views = vec![format!("{}.id", q.root)];
        } else {
            let classes: Vec<&str> = q
                .views
                .iter()
                .map(|v| v.rsplit_once('.').map_or(v.as_str(), |(class, _)| class))
                .unique()
                .collect();
            if let [class] = classes.as_slice() {
                q.views = vec![format!("{}.id", class)];
            }
        }
        q
    }

    /// Run this query. Object formats need the data model, which is fetched
    /// (once per service) if necessary.
    pub async fn results<'s>(
        &self,
        service: &'s Service,
        format: RowFormat,
    ) -> Result<ResultIterator<'s>, Error> {
        self.results_with(service, format, Vec::new()).await
    }

    /// Shorthand for [RowFormat::ResultRow] results.
    pub async fn rows<'s>(&self, service: &'s Service) -> Result<ResultIterator<'s>, Error> {
        self.results(service, RowFormat::ResultRow).await
    }

    async fn results_with<'s>(
        &self,
        service: &'s Service,
        format: RowFormat,
        extra: Vec<(String, String)>,
    ) -> Result<ResultIterator<'s>, Error> {
        let class = if format == RowFormat::JsonObjects {
            Some(service.model().await?.get_class(&self.root)?)
        } else {
            None
        };
        let mut params = self.to_query_params();
        params.extend(extra);
        ResultIterator::new(service, QUERY_PATH, params, format, self.view(), class)
    }

    /// The first row of results, asking the server for no more than one.
    pub async fn first<'s>(
        &self,
        service: &'s Service,
        format: RowFormat,
    ) -> Result<Option<Row<'s>>, Error> {
        let size = vec![("size".to_string(), "1".to_string())];
        self.results_with(service, format, size).await?.first().await
    }

    /// Number of rows this query matches, counted by the server.
    pub async fn count(&self, service: &Service) -> Result<u64, Error> {
        let first = self.first(service, RowFormat::Count).await?;
        match first {
            Some(Row::Text(text)) => text.trim().parse::<u64>().map_err(|_| {
                Error::from(ProtocolError::UnexpectedValue {
                    expected: "a row count",
                    actual: text,
                })
            }),
            other => Err(ProtocolError::UnexpectedValue {
                expected: "a row count",
                actual: format!("{:?}", other),
            }
            .into()),
        }
    }
}

impl Queryable for PathQuery {
    fn to_query(&self) -> PathQuery {
        self.clone()
    }
}

fn escape(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    #[fixture]
    fn query() -> PathQuery {
        PathQuery::new("genomic", "Gene")
    }

    #[rstest]
    fn test_qualify_paths(query: PathQuery) {
        let q = query
            .select(["symbol", "Gene.length", "organism.name"])
            .constrain("symbol", "=", "eve");
        assert_eq!(q.views(), ["Gene.symbol", "Gene.length", "Gene.organism.name"]);
        assert_eq!(q.constraints()[0].path, "Gene.symbol");
    }

    #[rstest]
    fn test_to_xml(query: PathQuery) {
        let q = query
            .select(["symbol"])
            .outer_join("organism")
            .constrain("id", "=", 7)
            .constrain("symbol", "!=", "a<b & \"c\"");
        assert_eq!(
            q.to_xml(),
            "<query model=\"genomic\" view=\"Gene.symbol\">\
             <join path=\"Gene.organism\" style=\"OUTER\"/>\
             <constraint path=\"Gene.id\" op=\"=\" value=\"7\"/>\
             <constraint path=\"Gene.symbol\" op=\"!=\" value=\"a&lt;b &amp; &quot;c&quot;\"/>\
             </query>"
        );
        assert_eq!(q.to_query_params()[0].0, "query");
    }

    #[rstest]
    fn test_listable_without_view(query: PathQuery) {
        assert_eq!(query.listable().views(), ["Gene.id"]);
    }

    #[rstest]
    fn test_listable_single_class(query: PathQuery) {
        let q = query.select(["organism.name", "organism.taxonId"]);
        assert_eq!(q.listable().views(), ["Gene.organism.id"]);
    }

    #[rstest]
    fn test_listable_ambiguous(query: PathQuery) {
        let q = query.select(["symbol", "organism.name"]);
        assert_eq!(q.listable().views(), q.views());
    }

    #[rstest]
    fn test_select_replaces(query: PathQuery) {
        let q = query.select(["symbol"]).add_view(["length"]).select(["id"]);
        assert_eq!(q.views(), ["Gene.id"]);
        assert_eq!(q.view().root(), Some("Gene"));
    }
}
