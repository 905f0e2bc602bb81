pub use time_wheel::{TimeWheel, WheelEntry, HEART_WHEEL_POS};

mod time_wheel;
