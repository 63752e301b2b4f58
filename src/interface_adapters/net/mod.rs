// Network adapter modules split by external client sockets vs internal HTTP routes.

pub mod client;
pub mod internal;

pub use client::{spawn_orphan_settler, spawn_room_serializer, ws_handler};
pub use internal::{create_room_handler, room_snapshot_handler};
