//! Latch-mode and pending-I/O vocabulary shared by frames and the latch layer.

/// Mode a caller requests (or deliberately skips) when latching a bucket or frame.
///
/// The discriminants are distinct bits so modes can be recorded in compact
/// bookkeeping words, but a `LatchMode` value always names exactly one mode.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum LatchMode {
    /// Shared: compatible with other shared holders and with one update holder.
    Shared = 1 << 0,
    /// Exclusive: compatible with nothing.
    Exclusive = 1 << 1,
    /// Shared-exclusive (update): one holder, compatible with shared holders.
    SharedExclusive = 1 << 2,
    /// The call site intentionally does not latch.
    NoLatch = 1 << 3,
}

impl LatchMode {
    /// Bit representation.
    pub const fn bits(self) -> u8 {
        self as u8
    }

    /// Decodes a single-mode bit pattern. Combined or unknown bits yield `None`,
    /// so `NoLatch` can never be read back together with another mode.
    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            1 => Some(LatchMode::Shared),
            2 => Some(LatchMode::Exclusive),
            4 => Some(LatchMode::SharedExclusive),
            8 => Some(LatchMode::NoLatch),
            _ => None,
        }
    }

    /// True for every mode that actually acquires the latch.
    pub const fn is_latched(self) -> bool {
        !matches!(self, LatchMode::NoLatch)
    }

    /// Whether a holder in this mode may change frame io-fix state.
    pub const fn permits_io_fix(self) -> bool {
        matches!(self, LatchMode::Exclusive | LatchMode::SharedExclusive)
    }
}

/// Outstanding I/O (or pin) on a cached frame.
///
/// `Read` and `Write` are only ever entered from and left to `None`. `Pin` is
/// reported when no I/O is pending but the frame is pinned; pinning nests and
/// is tracked separately by the frame, so `Pin` is never a transition target.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Default)]
pub enum IoFix {
    /// No pending I/O.
    #[default]
    None = 0,
    /// A read into the frame is in flight.
    Read = 1,
    /// A write of the frame is in flight.
    Write = 2,
    /// The frame must not be relocated or dropped from the flush list.
    Pin = 3,
}

impl IoFix {
    /// Whether `from -> to` is a legal io-fix transition.
    pub const fn can_transition(from: IoFix, to: IoFix) -> bool {
        matches!(
            (from, to),
            (IoFix::None, IoFix::Read)
                | (IoFix::None, IoFix::Write)
                | (IoFix::Read, IoFix::None)
                | (IoFix::Write, IoFix::None)
        )
    }

    pub(crate) const fn from_u8(raw: u8) -> IoFix {
        match raw {
            1 => IoFix::Read,
            2 => IoFix::Write,
            3 => IoFix::Pin,
            _ => IoFix::None,
        }
    }
}
