pub mod file_date;

pub use file_date::{is_raster, masked_name, FileDate};
