pub mod config;
pub mod cursor;
pub mod error;
pub mod feed;
pub mod humanize;
pub mod icon;
pub mod presentation;
pub mod scheduler;

#[cfg(test)]
mod test_server;
