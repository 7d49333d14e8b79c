//! Stream lifecycle flags carried in the frame header.

use std::{
    fmt,
    ops::{BitOr, BitOrAssign},
};

/// Bitset of the `SYN`, `ACK`, `FIN` and `RST` flags.
///
/// The header reserves 16 bits for flags. Only the low four carry meaning;
/// the remaining bits are preserved verbatim so that decoding followed by
/// encoding reproduces the original header.
///
/// # Examples
///
/// ```
/// use muxframe::frame::Flags;
///
/// let flags = Flags::SYN | Flags::FIN;
/// assert!(flags.contains(Flags::SYN));
/// assert!(!flags.contains(Flags::ACK));
/// assert_eq!(flags.bits(), 0b101);
/// ```
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Flags(u16);

impl Flags {
    /// No flags set.
    pub const NONE: Self = Self(0);
    /// Opens a new stream.
    pub const SYN: Self = Self(0x1);
    /// Acknowledges a stream opened by the peer.
    pub const ACK: Self = Self(0x2);
    /// Half-closes the sending direction of a stream.
    pub const FIN: Self = Self(0x4);
    /// Resets a stream immediately.
    pub const RST: Self = Self(0x8);

    /// Build a flag set from its raw header bits.
    #[must_use]
    pub const fn from_bits(bits: u16) -> Self { Self(bits) }

    /// Return the raw header bits.
    #[must_use]
    pub const fn bits(self) -> u16 { self.0 }

    /// Report whether every flag in `other` is also set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool { self.0 & other.0 == other.0 }

    /// Report whether no flag is set.
    #[must_use]
    pub const fn is_empty(self) -> bool { self.0 == 0 }

    /// Report whether the set carries any stream lifecycle flag.
    #[must_use]
    pub const fn has_lifecycle(self) -> bool {
        self.0 & (Self::SYN.0 | Self::ACK.0 | Self::FIN.0 | Self::RST.0) != 0
    }
}

impl BitOr for Flags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output { Self(self.0 | rhs.0) }
}

impl BitOrAssign for Flags {
    fn bitor_assign(&mut self, rhs: Self) { self.0 |= rhs.0; }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(Flags, &str); 4] = [
            (Flags::SYN, "SYN"),
            (Flags::ACK, "ACK"),
            (Flags::FIN, "FIN"),
            (Flags::RST, "RST"),
        ];
        if self.is_empty() {
            return f.write_str("NONE");
        }
        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        let unknown = self.0 & !0xF;
        if unknown != 0 {
            if !first {
                f.write_str("|")?;
            }
            write!(f, "{unknown:#06x}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::Flags;

    #[rstest]
    #[case(Flags::NONE, "NONE")]
    #[case(Flags::SYN | Flags::ACK, "SYN|ACK")]
    #[case(Flags::RST, "RST")]
    #[case(Flags::from_bits(0x14), "FIN|0x0010")]
    fn debug_lists_set_flags(#[case] flags: Flags, #[case] expected: &str) {
        assert_eq!(format!("{flags:?}"), expected);
    }

    #[test]
    fn lifecycle_covers_every_stream_flag() {
        assert!(Flags::FIN.has_lifecycle());
        assert!(Flags::RST.has_lifecycle());
        assert!(!Flags::NONE.has_lifecycle());
        assert!(!Flags::from_bits(0x10).has_lifecycle());
    }
}
