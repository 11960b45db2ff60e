//! Built-in middleware

mod trace;

pub use self::trace::TracingMiddleware;
