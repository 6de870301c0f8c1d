pub mod analysis;
pub mod capability;
pub mod confidence;
pub mod evidence;
pub mod execution;
pub mod plan;
pub mod query;
