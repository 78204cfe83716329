//! Adapters for the workspace service that owns clients, projects, tasks,
//! time entries, feedback and absences.

pub mod client;
pub mod mapping;
pub mod page;
pub mod query;
pub mod sink;
pub mod source;

pub use client::{WorkspaceClient, WorkspaceClientConfig};
pub use sink::{TaskCreationSink, TimeWriteOffSink};
pub use source::WorkspaceSource;
