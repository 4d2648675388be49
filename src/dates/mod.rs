//! Relative date literals and their resolution.
//!
//! Literals such as `TODAY` or `LAST_N_DAYS:30` are parsed into
//! [`DateLiteral`] values. The compiler leaves them as placeholders; a
//! [`DateResolver`] turns them into concrete UTC instants at execution time
//! so that cached compiled queries stay valid across days.

mod clock;
mod literal;
mod resolver;

pub use clock::{Clock, FixedClock, SystemClock};
pub use literal::{DateLiteral, DynamicDateKind, StaticDateLiteral};
pub use resolver::{DateRange, DateResolver};
