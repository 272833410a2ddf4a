pub mod config;
pub mod llm;
pub mod markdown;
pub mod render;
pub mod store;
pub mod transcript;
pub mod url;
pub mod viewer;
pub mod virtual_list;
pub mod watch;
