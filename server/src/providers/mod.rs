//! External collaborators, treated as duck-typed capabilities (§9): the diarization
//! provider, the summarization provider, and the vector store. Each is a small trait
//! with the exact method shapes the design calls for; the only implementation shipped
//! here talks HTTP to a configured endpoint, following the same "trait + concrete
//! adapter behind it" split the router module uses to pick between model backends.

pub mod diarizer;
pub mod summarizer;
pub mod vector_store;

pub use diarizer::{DiarizationProvider, DiarizedUtterance, HttpDiarizationProvider};
pub use summarizer::{HttpSummaryProvider, Summary, SummaryProvider};
pub use vector_store::{HttpVectorStore, VectorMatch, VectorRecord, VectorStore};
