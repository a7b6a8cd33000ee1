//! Event-type tags.
//!
//! Domain modules pick a tag and one of the dispatcher primitives; the tag is
//! the only thing that distinguishes, say, a fee receipt from an exam result.

// Domain events.

/// Attendance was marked for a student (usually sent to the parent's user room).
pub const ATTENDANCE_MARKED: &str = "attendance:marked";
/// A fee payment was recorded.
pub const FEE_PAID: &str = "fee:paid";
/// A fee is due or overdue.
pub const FEE_REMINDER: &str = "fee:reminder";
/// Exam results were published.
pub const EXAM_RESULT: &str = "exam:result";
/// An exam was scheduled or rescheduled.
pub const EXAM_SCHEDULED: &str = "exam:scheduled";
/// Emergency alert, normally sent tenant-wide.
pub const EMERGENCY_ALERT: &str = "emergency:alert";
/// An assignment was posted. Delivered tenant-wide.
pub const ASSIGNMENT_POSTED: &str = "assignment:posted";
/// Homework was assigned.
pub const HOMEWORK_ASSIGNED: &str = "homework:assigned";
/// A school event or holiday was announced.
pub const EVENT_ANNOUNCED: &str = "event:announced";
/// A direct message arrived.
pub const MESSAGE_RECEIVED: &str = "message:received";
/// Generic notification.
pub const NOTIFICATION_NEW: &str = "notification:new";

// Hub control frames.

/// First frame after activation.
pub const CONNECTION_ESTABLISHED: &str = "connection.established";
/// Reply to a successful ad-hoc join.
pub const ROOM_JOINED: &str = "room.joined";
/// Reply to a successful ad-hoc leave.
pub const ROOM_LEFT: &str = "room.left";
/// Reply to a client `ping` frame.
pub const PONG: &str = "pong";
/// An inbound frame could not be understood.
pub const ERROR: &str = "error";

/// Every domain tag, for validation and docs.
pub const DOMAIN_EVENTS: [&str; 11] = [
    ATTENDANCE_MARKED,
    FEE_PAID,
    FEE_REMINDER,
    EXAM_RESULT,
    EXAM_SCHEDULED,
    EMERGENCY_ALERT,
    ASSIGNMENT_POSTED,
    HOMEWORK_ASSIGNED,
    EVENT_ANNOUNCED,
    MESSAGE_RECEIVED,
    NOTIFICATION_NEW,
];
