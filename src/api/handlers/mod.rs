pub mod prompts;
pub mod tools;
