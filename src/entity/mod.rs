//! Value types shared by every storage component.

pub mod bounding_box;
pub mod table_name;
pub mod tuple;

pub use bounding_box::BoundingBox;
pub use table_name::TableName;
pub use tuple::{
    can_store_contain_newer, microtime, most_recent, visible, Tuple, TupleBody, VersionedKey,
    DELETED_MARKER,
};
