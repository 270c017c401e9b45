pub mod mock;
pub mod openai;
pub mod prompt;
pub mod twilio;

pub use mock::{RecordingMessenger, ScriptedTranslator, SentMessage};
pub use openai::OpenAiTranslator;
pub use prompt::system_prompt;
pub use twilio::TwilioMessenger;
