// Interactive input and argument validation shared by the commands.

pub mod prompt_manager;
pub mod validators;

pub use prompt_manager::PromptManager;
