mod headers;
pub mod progress;
mod time;

pub use self::headers::parse_headers;
pub use self::time::parse_age;
