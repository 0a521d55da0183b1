//! NewType for the base URL of an InterMine web service.

use crate::errors::InvalidServiceRoot;
use aliri_braid::braid;

/// A [ServiceRoot] is the base URL of a mine's web services, e.g.
/// `https://www.flymine.org/flymine/service`
#[braid(validator, serde)]
pub struct ServiceRoot(String);

impl aliri_braid::Validator for ServiceRoot {
    type Error = InvalidServiceRoot;

    fn validate(s: &str) -> Result<(), Self::Error> {
        if !(s.starts_with("http://") || s.starts_with("https://")) {
            Err(InvalidServiceRoot::Protocol(s.to_string()))
        } else if !s.ends_with("/service") {
            Err(InvalidServiceRoot::Suffix(s.to_string()))
        } else {
            Ok(())
        }
    }
}

impl ServiceRoot {
    /// Accept the loose forms people usually type, adding a missing
    /// `http://` scheme and `/service` suffix.
    ///
    /// ```
    /// use intermine::types::ServiceRoot;
    /// let root = ServiceRoot::normalize("www.flymine.org/flymine").unwrap();
    /// assert_eq!(root.as_str(), "http://www.flymine.org/flymine/service");
    /// ```
    pub fn normalize(root: &str) -> Result<Self, InvalidServiceRoot> {
        let root = root.trim().trim_end_matches('/');
        let root = if root.contains("://") {
            root.to_string()
        } else {
            format!("http://{}", root)
        };
        if root.ends_with("/service") {
            Self::try_from(root)
        } else {
            Self::try_from(format!("{}/service", root))
        }
    }
}

impl ServiceRootRef {
    /// Absolute URL of a resource under this root. `path` starts with `/`.
    pub fn join(&self, path: &str) -> String {
        format!("{}{}", self.as_str(), path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    #[rstest]
    #[case("http://localhost/service")]
    #[case("http://localhost:8080/intermine-demo/service")]
    #[case("https://www.flymine.org/flymine/service")]
    fn test_parse_url(#[case] url: &str) {
        assert!(ServiceRoot::try_from(url).is_ok());
    }

    #[rstest]
    #[case("ftp://localhost/service")]
    #[case("localhost/service")]
    fn test_reject_bad_protocol(#[case] url: &str) {
        assert!(matches!(
            ServiceRoot::try_from(url).unwrap_err(),
            InvalidServiceRoot::Protocol { .. }
        ))
    }

    #[rstest]
    #[case("http://localhost")]
    #[case("http://localhost/")]
    #[case("http://localhost/service/")]
    fn test_reject_bad_suffix(#[case] url: &str) {
        assert!(matches!(
            ServiceRoot::try_from(url).unwrap_err(),
            InvalidServiceRoot::Suffix { .. }
        ))
    }

    #[rstest]
    #[case("localhost", "http://localhost/service")]
    #[case("localhost/service", "http://localhost/service")]
    #[case("https://mine.example.org/query/", "https://mine.example.org/query/service")]
    #[case("http://localhost:8080/demo/service/", "http://localhost:8080/demo/service")]
    fn test_normalize(#[case] given: &str, #[case] expected: &str) {
        assert_eq!(ServiceRoot::normalize(given).unwrap().as_str(), expected);
    }

    #[test]
    fn test_normalize_rejects_other_schemes() {
        assert!(ServiceRoot::normalize("ftp://localhost").is_err());
    }

    #[test]
    fn test_join() {
        let root = ServiceRoot::normalize("localhost").unwrap();
        assert_eq!(root.join("/lists"), "http://localhost/service/lists");
    }
}
