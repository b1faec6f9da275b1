pub mod content;
pub mod favorites;
pub mod preferences;
pub mod search;
