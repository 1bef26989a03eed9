pub mod slug;
pub mod track;
