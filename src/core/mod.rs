pub mod error;
pub mod value;

pub use error::{InvalidValueError, MapperError, Result};
pub use value::{KeyTuple, Primitive, Value};
