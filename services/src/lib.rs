pub mod uuid;

pub use crate::uuid::{chunk_point_id, stable_uuid};
