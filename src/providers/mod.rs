pub mod baseten;
pub mod factory;
pub mod http_client;
pub mod openai;
pub mod traits;

pub use baseten::BasetenProvider;
pub use factory::create_provider;
pub use openai::OpenAiProvider;
pub use traits::{Completion, CompletionProvider, ImageData, TokenUsage, UserContent};
