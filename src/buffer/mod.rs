mod buffer_pool;
mod lru_cache;
mod page_descriptor;
mod page_guard;

pub use buffer_pool::*;
pub use lru_cache::*;
pub use page_descriptor::*;
pub use page_guard::*;
