pub mod dedup_file;
pub mod media_store;
pub mod post_log;

pub use dedup_file::{DedupFile, DedupState};
pub use media_store::{infer_extension, media_file_name, MediaStore};
pub use post_log::{format_record, PostLog};
