use crate::constants::JSON_ROWS_VERSION;
use crate::errors::Error;
use itertools::Itertools;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// How each result record is materialised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowFormat {
    /// [crate::ResultRow] values (`rr`).
    ResultRow,
    /// Cell values as a JSON array.
    List,
    /// Cell values keyed by full view path.
    Dict,
    Tsv,
    Csv,
    Count,
    Json,
    JsonRows,
    JsonObjects,
}

/// Which decoder and per-row transform a [RowFormat] uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatFamily {
    /// Rows parsed into [crate::ResultRow]s.
    Parsed,
    /// Lines of text.
    Flat,
    /// Rows left as raw JSON.
    Json,
    /// Rows wrapped as [crate::ResultObject]s.
    Objects,
}

impl RowFormat {
    pub const ALL: [RowFormat; 9] = [
        RowFormat::ResultRow,
        RowFormat::List,
        RowFormat::Dict,
        RowFormat::Tsv,
        RowFormat::Csv,
        RowFormat::Count,
        RowFormat::Json,
        RowFormat::JsonRows,
        RowFormat::JsonObjects,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            RowFormat::ResultRow => "rr",
            RowFormat::List => "list",
            RowFormat::Dict => "dict",
            RowFormat::Tsv => "tsv",
            RowFormat::Csv => "csv",
            RowFormat::Count => "count",
            RowFormat::Json => "json",
            RowFormat::JsonRows => "jsonrows",
            RowFormat::JsonObjects => "jsonobjects",
        }
    }

    pub fn family(&self) -> FormatFamily {
        match self {
            RowFormat::ResultRow | RowFormat::List | RowFormat::Dict => FormatFamily::Parsed,
            RowFormat::Tsv | RowFormat::Csv | RowFormat::Count => FormatFamily::Flat,
            RowFormat::Json | RowFormat::JsonRows => FormatFamily::Json,
            RowFormat::JsonObjects => FormatFamily::Objects,
        }
    }

    /// Value of the `format` request parameter for a service of the given version.
    pub fn wire_format(&self, version: u32) -> &'static str {
        match self.family() {
            FormatFamily::Parsed if version >= JSON_ROWS_VERSION => "json",
            FormatFamily::Parsed => "jsonrows",
            _ if *self == RowFormat::Tsv => "tab",
            _ => self.name(),
        }
    }
}

impl FromStr for RowFormat {
    type Err = Error;

    /// Anything starting with "object" means [RowFormat::JsonObjects].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with("object") {
            return Ok(RowFormat::JsonObjects);
        }
        RowFormat::ALL
            .into_iter()
            .find(|f| f.name() == s)
            .ok_or_else(|| Error::InvalidRowFormat {
                name: s.to_string(),
                valid: RowFormat::ALL.iter().map(|f| f.name()).join(", "),
            })
    }
}

impl Display for RowFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    #[rstest]
    #[case("rr", RowFormat::ResultRow)]
    #[case("dict", RowFormat::Dict)]
    #[case("tsv", RowFormat::Tsv)]
    #[case("jsonobjects", RowFormat::JsonObjects)]
    #[case("object", RowFormat::JsonObjects)]
    #[case("objects", RowFormat::JsonObjects)]
    #[case("objectformat", RowFormat::JsonObjects)]
    fn test_parse(#[case] name: &str, #[case] expected: RowFormat) {
        assert_eq!(name.parse::<RowFormat>().unwrap(), expected)
    }

    #[rstest]
    #[case("xml")]
    #[case("RR")]
    #[case("")]
    fn test_reject_unknown(#[case] name: &str) {
        let err = name.parse::<RowFormat>().unwrap_err();
        assert!(matches!(err, Error::InvalidRowFormat { .. }));
        assert!(err.to_string().contains("jsonobjects"));
    }

    #[rstest]
    #[case(RowFormat::ResultRow, 8, "json")]
    #[case(RowFormat::ResultRow, 7, "jsonrows")]
    #[case(RowFormat::Dict, 31, "json")]
    #[case(RowFormat::List, 2, "jsonrows")]
    #[case(RowFormat::Tsv, 31, "tab")]
    #[case(RowFormat::Csv, 31, "csv")]
    #[case(RowFormat::Count, 31, "count")]
    #[case(RowFormat::JsonRows, 31, "jsonrows")]
    #[case(RowFormat::JsonObjects, 4, "jsonobjects")]
    fn test_wire_format(#[case] format: RowFormat, #[case] version: u32, #[case] expected: &str) {
        assert_eq!(format.wire_format(version), expected)
    }

    #[test]
    fn test_names_round_trip() {
        for format in RowFormat::ALL {
            assert_eq!(format.to_string().parse::<RowFormat>().unwrap(), format);
        }
    }
}
