pub mod completions;
pub mod config;
pub mod emit;
pub mod observe;
pub mod schema;
pub mod serve;
pub mod session;
pub mod track;
