//! File formats: session configuration and recorded frame lists.

pub mod config;
pub mod frame_list;

pub use config::SessionConfig;
pub use frame_list::{FrameEntry, load_frame_list, load_gray_image};
