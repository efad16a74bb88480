//! Writing, querying and streaming messages

mod feed;
mod query;
mod writer;

pub use feed::authorized_feed;
pub use query::{MessageQuery, MessageQueryEngine, MAX_PAGE_SIZE};
pub use writer::{MessageWriter, Recipient, SendError, MAX_CREATE_MESSAGE_ATTEMPTS};
