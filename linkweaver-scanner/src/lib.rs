pub mod error;
pub mod extract;
pub mod fetcher;
pub mod result;

pub use error::FetchError;
pub use extract::{extract_text, extract_title};
pub use fetcher::{FetchEventCallback, Fetcher};
pub use result::{FetchEvent, FetchedPage};
