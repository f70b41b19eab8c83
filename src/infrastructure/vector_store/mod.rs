mod couchbase;
mod in_memory;

pub use couchbase::{CouchbaseVectorStore, Endpoints};
pub use in_memory::InMemoryVectorStore;
