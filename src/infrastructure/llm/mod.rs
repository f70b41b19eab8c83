mod openai;
mod timeout;

pub use openai::OpenAiLlm;
pub use timeout::TimeoutLlm;
