pub mod file_list;
pub mod memory;
pub mod range_fetcher;
pub mod source;

pub use file_list::{descriptor_from_url, expand_url, FileLister};
pub use memory::MemorySource;
pub use range_fetcher::RangeFetcher;
pub use source::{HttpSource, RemoteSource};
