//! Client for the web services of InterMine data warehouses ("mines").
//!
//! Connect with [Service::connect], then run queries, resolve identifiers
//! with [Service::resolve_ids] and manage lists with [Service::list_manager].

#[macro_use]
extern crate shrinkwraprs;

pub mod config;
mod constants;
pub mod errors;
pub mod idresolution;
pub mod lists;
pub mod model;
pub mod query;
pub mod results;
mod service;
pub mod transport;
pub mod types;

pub use errors::Error;
pub use idresolution::{IdResolutionRequest, Job, JobStatus};
pub use lists::{Content, List, ListManager, ListOperand, ListOptions};
pub use model::{ClassDescriptor, Field, FieldKind, Model};
pub use query::{PathQuery, Queryable};
pub use results::{ResultIterator, ResultObject, ResultRow, Row, RowFormat};
pub use service::{Service, ServiceBuilder};
pub use transport::{HttpOpener, Opener};
