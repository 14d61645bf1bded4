// Include handlers module directly from handlers.rs
#[path = "handlers.rs"]
pub mod handlers;

// Re-export commonly used handler functions for convenience
pub use handlers::{
    expand_output_path, load_records_from_file, parse_records, progress_callback,
    select_generator,
};
