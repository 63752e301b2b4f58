// Domain-level errors for room operations.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomError {
    // Rejected before any state changes (bad heading, bad name, etc.).
    InvalidInput(&'static str),
    // Soft failure: the id is not a member of the room.
    UnknownPlayer,
    AlreadyJoined,
    // The room task is gone and can no longer accept events.
    RoomClosed,
}
