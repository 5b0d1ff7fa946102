pub mod board;
pub mod mapping;
pub mod task;
pub mod work_item;
