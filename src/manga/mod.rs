pub mod checker;
pub mod pattern;
pub mod source;
pub mod tracker;

pub use checker::MangaChecker;
pub use tracker::TrackerService;
