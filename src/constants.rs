use std::time::Duration;

pub(crate) const QUERY_PATH: &str = "/query/results";
pub(crate) const QUERY_LIST_UPLOAD_PATH: &str = "/query/tolist";
pub(crate) const QUERY_LIST_APPEND_PATH: &str = "/query/append/tolist";
pub(crate) const MODEL_PATH: &str = "/model";
pub(crate) const VERSION_PATH: &str = "/version/ws";
pub(crate) const RELEASE_PATH: &str = "/version/release";

pub(crate) const LIST_PATH: &str = "/lists";
pub(crate) const LIST_RENAME_PATH: &str = "/lists/rename";
pub(crate) const LIST_APPENDING_PATH: &str = "/lists/append";
pub(crate) const LIST_TAG_PATH: &str = "/list/tags";
pub(crate) const INTERSECTION_PATH: &str = "/lists/intersect/json";
pub(crate) const UNION_PATH: &str = "/lists/union/json";
pub(crate) const DIFFERENCE_PATH: &str = "/lists/diff/json";
pub(crate) const SUBTRACTION_PATH: &str = "/lists/subtract/json";

pub(crate) const IDS_PATH: &str = "/ids";

pub(crate) const DEFAULT_LIST_NAME: &str = "my_list";
pub(crate) const DEFAULT_DESCRIPTION: &str = "List created with Rust client library";

pub(crate) const INITIAL_BACKOFF: Duration = Duration::from_millis(50);
pub(crate) const INITIAL_DECAY: f64 = 1.25;
pub(crate) const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Minimum web service version for token authentication.
pub(crate) const TOKEN_AUTH_VERSION: u32 = 6;
/// Minimum web service version for the id resolution service.
pub(crate) const ID_RESOLUTION_VERSION: u32 = 10;
/// Web services from this version on use the bare `json` row format.
pub(crate) const JSON_ROWS_VERSION: u32 = 8;

pub(crate) const USER_AGENT: &str = concat!("InterMine-Client-", env!("CARGO_PKG_VERSION"), "/rust");
