mod vertex_rag_client;

pub use vertex_rag_client::VertexRagClient;
