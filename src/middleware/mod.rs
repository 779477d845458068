//! Small `tower`/`axum` layers shared by the REST surface. Generalizes
//! the teacher's inline `axum_middleware::from_fn` closure in `main.rs`
//! into a named module, since this service now has more than one layer
//! worth naming.

mod headers;

pub use headers::header_middleware;
