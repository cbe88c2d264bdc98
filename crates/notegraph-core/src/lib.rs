pub mod config;
pub mod context;
pub mod document;
pub mod error;
pub mod plugin;
pub mod services;
pub mod storage;
pub mod sync;
pub mod xref;

pub use config::{NotegraphConfig, PipelineConfig, ServiceConfig, ServicesConfig, SyncConfig, XrefConfig};
pub use context::NotegraphContext;
pub use document::{Document, DocumentFormat, DocumentMetadata};
pub use error::{Error, Result};
pub use plugin::{
    PipelineExecutor, Plugin, PluginDescriptor, PluginRegistry, ProcessingResult,
};
pub use services::{
    AnalyzeResponse, HealthReport, HealthState, QueryResponse, RankedDocument, ServiceClientManager,
    ServiceDescriptor,
};
pub use storage::Storage;
pub use sync::{OrgSyncManager, SyncStatus, SyncTask};
pub use xref::{CrossReferenceEdge, CrossReferenceEngine, EdgeKind, GraphSnapshot, KnowledgeGraph};
