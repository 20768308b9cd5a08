pub mod colorizer;
pub mod fetcher;
pub mod gallery;
pub mod history;
pub mod kv;
pub mod poller;
pub mod thumbnail;
pub mod uploader;
