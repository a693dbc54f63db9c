pub mod peak;
pub mod stamp;

pub use peak::PeakPair;
pub use stamp::RTT_MAX;
