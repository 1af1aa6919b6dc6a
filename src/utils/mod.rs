//! Utility modules for the site builder.

pub mod exec;
pub mod fs;
pub mod markdown;
pub mod slug;
