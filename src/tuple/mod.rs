mod tuple;
mod value;

pub use tuple::{Tuple, TupleBuilder};
pub use value::{TypeTag, Value};
