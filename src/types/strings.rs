use aliri_braid::braid;

/// Name of a list stored on a mine.
#[braid(serde)]
pub struct ListName;

/// Identifier the server assigns to an id resolution job.
#[braid(serde)]
pub struct JobUid;
