pub mod models;
pub mod providers;
pub mod utils;

pub use shoppo_catalog as catalog;
