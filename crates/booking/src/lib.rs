pub mod client;
pub mod context;
pub mod dates;

pub use client::{
    BookingConfirmation, DisabledSchedulingClient, HttpSchedulingClient, SchedulingClient,
    SchedulingError, SlotCheck,
};
pub use context::{
    AppointmentContext, AppointmentContextBuilder, ContextKind, SchedulingContextBuilder,
};
pub use dates::extract_datetime;
