pub mod client;

pub use client::UnsplashSearchClient;
