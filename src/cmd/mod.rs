mod camera;
mod caption;
mod labels;
mod make;
mod output;

pub use camera::cmd_camera;
pub use caption::cmd_caption;
pub use labels::cmd_labels;
pub use make::cmd_make;
