pub mod openai;
pub mod traits;
pub mod util;

pub use openai::{OpenAi, StructuredOutput};
pub use traits::{
    ChatCompleter, Completion, CompletionRequest, FinishReason, Message, MessageRole,
};
pub use util::strip_code_blocks;
