//! Strongly typed identifier wrappers.
//!
//! Identifiers arrive from devices and reference-data systems as opaque
//! strings.  Each kind gets its own newtype so a `StopId` can never be passed
//! where a `TripId` is expected.  The inner `Arc<str>` makes clones a
//! reference-count bump, which matters because ids are copied into every
//! sample, event and index entry.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

/// Generate a typed identifier wrapper around `Arc<str>`.
macro_rules! typed_id {
    ($(#[$attr:meta])* $vis:vis struct $name:ident;) => {
        $(#[$attr])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
        #[derive(serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        $vis struct $name(Arc<str>);

        impl $name {
            #[inline]
            pub fn new(id: impl Into<Arc<str>>) -> Self {
                Self(id.into())
            }

            #[inline]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// `true` if the identifier is empty or whitespace only.
            #[inline]
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(Arc::from(s))
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(Arc::from(s))
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

typed_id! {
    /// One tracked journey of a bus along a scheduled route instance.
    pub struct TripId;
}

typed_id! {
    /// A bus-mounted telemetry device.
    pub struct DeviceId;
}

typed_id! {
    /// A physical bus.
    pub struct BusId;
}

typed_id! {
    /// A route in the reference-data catalog.
    pub struct RouteId;
}

typed_id! {
    /// A scheduled route instance (timetable reference).
    pub struct ScheduleId;
}

typed_id! {
    /// A stop in the reference-data catalog.
    pub struct StopId;
}

typed_id! {
    /// A person: driver, conductor, or the officer confirming a manual event.
    pub struct StaffId;
}
