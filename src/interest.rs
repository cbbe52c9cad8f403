pub mod cloud;
pub mod dedup;
pub mod matcher;
pub mod normalize;
pub mod similarity;
pub mod synonyms;
