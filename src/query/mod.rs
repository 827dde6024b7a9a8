//! Query handling: request adaptation, pipeline calls, and response sanitizing.

pub mod adapter;
pub mod presets;
pub mod sanitize;
mod service;
pub mod types;

pub use adapter::AdapterSettings;
pub use presets::{PresetError, PresetQueries};
pub use service::{AnalyzeError, SearchApi, SearchService};
pub use types::{
    AdvancedQueryRequest, Answer, Document, QueryError, QueryRequest, QueryResponse, Span,
};
