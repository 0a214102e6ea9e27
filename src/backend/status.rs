use core::fmt;

/// Where the backend is in its device lifecycle
///
/// ```text
/// Closed ──open──▶ Opened ──query──▶ Queried ──map──▶ Mapped
///    ▲                                  ▲               │
///    │                                  └────unmap──────┘
///    └──────────────────close──────────────────────────
/// ```
///
/// Activation is tracked separately: a mapped head only reaches the screen
/// while its VT is in the foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Closed,
    Opened,
    Queried,
    Mapped,
}

impl DeviceState {
    pub fn is_open(self) -> bool {
        !matches!(self, DeviceState::Closed)
    }

    pub fn is_mapped(self) -> bool {
        matches!(self, DeviceState::Mapped)
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceState::Closed => write!(f, "Closed"),
            DeviceState::Opened => write!(f, "Opened"),
            DeviceState::Queried => write!(f, "Queried"),
            DeviceState::Mapped => write!(f, "Mapped"),
        }
    }
}
