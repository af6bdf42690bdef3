pub mod message;
pub mod raw_note;
