//! I/O collaborators: the article link corpus and the completion service.

pub mod completion;
pub mod link_store;
