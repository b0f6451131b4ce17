pub mod envelope;

pub use envelope::{Envelope, Link, Links};
