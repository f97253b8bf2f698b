// regtoken-sdk: Foundation layer for regtoken.
// This crate has no dependencies on other regtoken crates and provides
// build metadata, string parsing, and proxy discovery used by the others.

pub mod build_constants;
pub mod string_util;
pub mod web_proxy;

pub use build_constants::{Package, Source};
pub use string_util::StringUtil;
pub use web_proxy::WebProxy;
