use crate::errors::ProtocolError;
use crate::types::{headless, View};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::ops::Index;
use std::sync::{Arc, OnceLock};

/// How cells are encoded in a row of results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellStyle {
    /// Plain values (web service version 8 and later).
    Bare,
    /// `{"value": ...}` objects (older web services).
    Wrapped,
}

/// A row of results, addressable by column index, by full view path
/// (`Gene.symbol`) or by headless path (`symbol`).
#[derive(Debug, Clone)]
pub struct ResultRow {
    cells: Vec<Value>,
    view: Arc<View>,
    index_map: OnceLock<HashMap<String, usize>>,
}

impl ResultRow {
    /// Wrap a decoded row. It must be an array with one cell per view column.
    pub fn new(data: Value, view: Arc<View>, style: CellStyle) -> Result<Self, ProtocolError> {
        let cells = match data {
            Value::Array(cells) => cells,
            other => {
                return Err(ProtocolError::UnexpectedValue {
                    expected: "an array of cells",
                    actual: other.to_string(),
                })
            }
        };
        if cells.len() != view.len() {
            return Err(ProtocolError::RowLength {
                expected: view.len(),
                actual: cells.len(),
            });
        }
        let cells = match style {
            CellStyle::Bare => cells,
            CellStyle::Wrapped => cells.into_iter().map(unwrap_cell).collect::<Result<_, _>>()?,
        };
        Ok(Self {
            cells,
            view,
            index_map: OnceLock::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.cells.get(index)
    }

    /// Column index for a full or headless path. Where a name is ambiguous,
    /// the first column it matches wins.
    pub fn index_of(&self, key: &str) -> Option<usize> {
        let map = self.index_map.get_or_init(|| {
            let mut map = HashMap::new();
            for (i, path) in self.view.iter().enumerate() {
                map.entry(path.clone()).or_insert(i);
                map.entry(headless(path).to_string()).or_insert(i);
            }
            map
        });
        map.get(key).copied()
    }

    pub fn get_by_name(&self, key: &str) -> Option<&Value> {
        self.index_of(key).and_then(|i| self.cells.get(i))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index_of(key).is_some()
    }

    /// The full view paths, in column order.
    pub fn keys(&self) -> &[String] {
        &self.view
    }

    pub fn values(&self) -> &[Value] {
        &self.cells
    }

    pub fn to_list(&self) -> Vec<Value> {
        self.cells.clone()
    }

    /// `(path, value)` pairs in column order.
    pub fn items(&self) -> impl Iterator<Item = (&str, &Value)> + '_ {
        self.view.iter().map(String::as_str).zip(self.cells.iter())
    }

    pub fn to_dict(&self) -> Map<String, Value> {
        self.items()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }
}

fn unwrap_cell(cell: Value) -> Result<Value, ProtocolError> {
    match cell {
        Value::Object(mut cell) => Ok(cell.remove("value").unwrap_or(Value::Null)),
        other => Err(ProtocolError::UnexpectedValue {
            expected: "a {\"value\": ...} cell",
            actual: other.to_string(),
        }),
    }
}

impl Index<usize> for ResultRow {
    type Output = Value;

    fn index(&self, index: usize) -> &Value {
        &self.cells[index]
    }
}

impl Index<&str> for ResultRow {
    type Output = Value;

    /// Panics if the name is not in the view, like [HashMap]'s `Index`.
    fn index(&self, key: &str) -> &Value {
        match self.get_by_name(key) {
            Some(value) => value,
            None => panic!("no column called {:?} in view {}", key, self.view),
        }
    }
}

impl PartialEq for ResultRow {
    fn eq(&self, other: &Self) -> bool {
        self.cells == other.cells && self.view == other.view
    }
}

impl Display for ResultRow {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:", self.view.root().unwrap_or_default())?;
        for (path, value) in self.items() {
            write!(f, " {}=", headless(path))?;
            match value {
                Value::String(s) => write!(f, "'{}'", s)?,
                other => write!(f, "{}", other)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;
    use serde_json::json;

    #[fixture]
    fn view() -> Arc<View> {
        let view: View = ["Gene.symbol", "Gene.organism.name", "Gene.length"]
            .into_iter()
            .collect();
        Arc::new(view)
    }

    #[rstest]
    #[case(CellStyle::Bare, json!(["eve", "D. melanogaster", 1539]))]
    #[case(CellStyle::Wrapped, json!([
        {"value": "eve", "url": "/report/Gene/1"},
        {"value": "D. melanogaster"},
        {"value": 1539}
    ]))]
    fn test_lookup(view: Arc<View>, #[case] style: CellStyle, #[case] data: Value) {
        let row = ResultRow::new(data, view.clone(), style).unwrap();
        assert_eq!(row.len(), view.len());
        for (i, path) in view.iter().enumerate() {
            assert_eq!(row[i], row[path.as_str()]);
            assert_eq!(row[i], row[headless(path)]);
        }
        assert_eq!(row["symbol"], json!("eve"));
        assert_eq!(row["organism.name"], json!("D. melanogaster"));
        assert_eq!(row.get_by_name("Gene.length"), Some(&json!(1539)));
        assert!(row.get_by_name("name").is_none());
        assert!(!row.contains_key("Gene.name"));
    }

    #[test]
    fn test_ambiguous_headless_name_takes_first() {
        let view: View = ["Gene.symbol", "Protein.symbol"].into_iter().collect();
        let row = ResultRow::new(json!(["a", "b"]), Arc::new(view), CellStyle::Bare).unwrap();
        assert_eq!(row["symbol"], json!("a"));
        assert_eq!(row["Protein.symbol"], json!("b"));
    }

    #[rstest]
    fn test_length_mismatch(view: Arc<View>) {
        let err = ResultRow::new(json!(["eve"]), view, CellStyle::Bare).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::RowLength {
                expected: 3,
                actual: 1
            }
        ));
    }

    #[rstest]
    fn test_not_an_array(view: Arc<View>) {
        let err = ResultRow::new(json!({"symbol": "eve"}), view, CellStyle::Bare).unwrap_err();
        assert!(matches!(err, ProtocolError::UnexpectedValue { .. }));
    }

    #[rstest]
    fn test_views(view: Arc<View>) {
        let row = ResultRow::new(json!(["eve", null, 1539]), view, CellStyle::Bare).unwrap();
        assert_eq!(row.to_list(), vec![json!("eve"), Value::Null, json!(1539)]);
        assert_eq!(row.keys()[1], "Gene.organism.name");
        let dict = row.to_dict();
        assert_eq!(dict["Gene.symbol"], json!("eve"));
        assert_eq!(dict.len(), 3);
        assert_eq!(
            row.to_string(),
            "Gene: symbol='eve' organism.name=null length=1539"
        );
    }
}
