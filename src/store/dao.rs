pub mod stage;
pub mod tags;
pub mod vector;

pub use stage::StageSampleDao;
pub use tags::TagDao;
pub use vector::VectorDao;
