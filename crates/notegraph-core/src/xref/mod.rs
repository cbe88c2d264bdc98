pub mod engine;
pub mod fingerprint;
pub mod graph;

pub use engine::CrossReferenceEngine;
pub use fingerprint::Fingerprint;
pub use graph::{CrossReferenceEdge, EdgeKind, GraphSnapshot, KnowledgeGraph};
