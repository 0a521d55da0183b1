use itertools::Itertools;

/// The ordered output columns of a query, as full paths like `Gene.symbol`.
#[derive(Shrinkwrap, Debug, Clone, PartialEq, Eq, Default)]
pub struct View(pub Vec<String>);

impl View {
    /// Column names with the root class removed, e.g. `symbol` for `Gene.symbol`.
    pub fn headless(&self) -> impl Iterator<Item = &str> + '_ {
        self.0.iter().map(|p| headless(p))
    }

    /// The root class shared by the view, taken from the first column.
    pub fn root(&self) -> Option<&str> {
        self.0.first().and_then(|p| p.split('.').next())
    }
}

impl From<Vec<String>> for View {
    fn from(paths: Vec<String>) -> Self {
        Self(paths)
    }
}

impl<'a> FromIterator<&'a str> for View {
    fn from_iter<T: IntoIterator<Item = &'a str>>(iter: T) -> Self {
        Self(iter.into_iter().map(String::from).collect())
    }
}

impl std::fmt::Display for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.iter().join(" "))
    }
}

/// Strip the leading class segment of a path. Paths with no `.` are returned as-is.
pub fn headless(path: &str) -> &str {
    match path.split_once('.') {
        Some((root, rest)) if !root.is_empty() => rest,
        _ => path,
    }
}
