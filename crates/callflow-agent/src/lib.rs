//! Clients for the NLU engine, the embedding model and the vector index the
//! turn processor consults, plus the null implementations wired in when one
//! of them is not configured.

pub mod context;
pub mod dialogflow;
pub mod embedding;
pub mod error;
pub mod gcp_auth;
pub mod nlu;
pub mod retrieval;

pub use context::build_context_block;
pub use dialogflow::DialogflowClient;
pub use embedding::{DisabledEmbedder, Embedder, VertexEmbedder};
pub use error::{AuthError, EmbeddingError, NluError, RetrievalError};
pub use gcp_auth::GcpCredentials;
pub use nlu::{NluClient, NluRequest, NullNluClient};
pub use retrieval::{ContextQuery, ContextRetriever, ContextSnippet, NoopRetriever, VectorSearchRetriever};
