pub mod retriever;
pub mod vector;

pub use retriever::Retriever;
