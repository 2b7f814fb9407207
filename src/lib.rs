pub mod config;
pub mod nav;
pub mod script;
pub mod service;
#[doc(hidden)]
pub mod test_support;
pub mod text;
