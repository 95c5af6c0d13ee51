//! Parameter and body encoding.

pub mod body;
pub mod coerce;
pub mod style;

pub use body::{encode_body, to_yaml_value};
pub use coerce::try_fix_value_type;
pub use style::{encode_param, encode_value, must_string, query_escape, query_values, SerializationMethod};
