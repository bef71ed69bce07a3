mod page;
mod tuple_page;

pub use page::Page;
pub use tuple_page::{TuplePage, TuplePageRef, MAX_TUPLE_SIZE};
