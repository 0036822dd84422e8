//! Query construction, compilation, and iteration (spec §4.G, §4.H).

pub(crate) mod compiler;
pub mod fetch;
pub mod iter;
pub(crate) mod vm;

pub use fetch::{Fetch, FetchShape, FetchSlice, Read, Write};
pub use iter::{IterMode, QueryBuilder};
