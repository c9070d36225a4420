pub mod bar;
pub mod frame;
pub mod signal;

pub use bar::Bar;
pub use frame::Frame;
pub use signal::Signal;
