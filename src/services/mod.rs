pub mod captions;
pub mod command;
pub mod compositor;
pub mod dispatcher;
pub mod footage;
pub mod narration;
pub mod pipeline;
pub mod script;
pub mod storage;
pub mod store;
pub mod transcoder;
