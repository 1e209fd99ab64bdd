//! Translation between what clients send/expect and what the backend speaks.
//!
//! Request remapping, whole-response reshaping, and the streaming transcoder
//! that folds `reasoning_content` into `content`. Nothing here does I/O.

pub mod openai_types;
pub mod reasoning;
pub mod request;
pub mod response;
pub mod sse;
pub mod streaming;
