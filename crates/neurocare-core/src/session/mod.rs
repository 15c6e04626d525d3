//! Live therapy session management.
//!
//! ## Lifecycle
//!
//! ```text
//! Session Start
//!   │
//!   ├─► Check device connection
//!   │
//!   ├─► Start one-second elapsed-time tick
//!   │
//!   └─► Notify device (fire-and-forget)
//!
//! During Session
//!   │
//!   ├─► Temperature feed updates last reading + 30-sample window
//!   │
//!   └─► Intensity changes forwarded to the device
//!
//! Session End
//!   │
//!   ├─► Cancel tick, freeze duration
//!   │
//!   ├─► Notify device (fire-and-forget)
//!   │
//!   └─► Save record once (caller owns any retry)
//! ```

mod lifecycle;
mod temperature;

pub use lifecycle::*;
pub use temperature::TemperatureBuffer;
