pub mod batch;
pub mod page;
pub mod record;
pub mod value;
pub mod watermark;
