// src/lib.rs

// Import the top-level `ori` module.
pub mod ori;

// If you want to provide direct access (without having to navigate through the whole hierarchy) to certain types or functionalities at the crate level, you can use re-exports:

// Re-exporting key items for easier external access.
pub use ori::client_wrapper::{ClientWrapper, Message, Role};
pub use ori::llm_session::LLMSession;
// If you wish, you can also re-export specific clients or functionalities from the `clients` submodule:
// pub use ori::clients::openai;

/// Install `env_logger` as the global logger, ignoring repeat calls from parallel tests.
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
