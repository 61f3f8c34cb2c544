pub mod web;

pub use web::{TavilyClient, WebSearch};
