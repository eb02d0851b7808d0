pub mod db;
pub mod generation_llm;
pub mod local_store;
pub mod tts;

pub use db::PgRecordStore;
pub use generation_llm::OpenAiScriptAdapter;
pub use local_store::LocalFileStore;
pub use tts::OpenAiTtsAdapter;
