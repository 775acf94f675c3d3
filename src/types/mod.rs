//! Request description types.

mod params;

pub use params::RequestParams;
