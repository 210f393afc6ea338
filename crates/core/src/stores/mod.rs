pub mod blob;
pub mod index;

pub use blob::{AzureBlobStore, MemoryBlobStore, ObjectStore};
pub use index::{AzureSearchIndex, MemoryVectorIndex, VectorIndex};
