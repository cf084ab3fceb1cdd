//! A declarative validation engine for longitudinal clinical-research form records.
//!
//! A [`schema::Schema`] compiles a JSON or YAML rule document once into a tree of
//! [`rules::Rule`] objects; [`driver::QualityCheck`] drives that schema against one
//! [`record::Record`] at a time, returning a flat error map and an [`error::ErrorTree`].

pub mod datastore;
pub mod driver;
pub mod error;
pub mod evaluator;
pub mod logic;
pub mod record;
pub mod rules;
pub mod schema;
pub mod value;

pub use datastore::{Datastore, InMemoryDatastore};
pub use driver::{QualityCheck, ValidationOutcome};
pub use error::{ErrorTree, FieldError, SchemaError, SystemError};
pub use record::Record;
pub use rules::GdsRounding;
pub use schema::Schema;
pub use value::Value;
