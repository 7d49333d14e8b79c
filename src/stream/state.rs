//! Stream lifecycle state machine.

use thiserror::Error;

/// Lifecycle state of a stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamState {
    /// Created locally, `SYN` not yet sent.
    Idle,
    /// `SYN` sent, waiting for the peer's `ACK`.
    SynSent,
    /// `SYN` received, `ACK` not yet sent.
    SynReceived,
    /// Both directions open.
    Established,
    /// This side sent `FIN`; the peer may still send.
    LocalClose,
    /// The peer sent `FIN`; this side may still send.
    RemoteClose,
    /// Both directions closed or the stream was reset.
    Closed,
}

/// Event driving a [`StreamState`] transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    /// This side sent `SYN`.
    SendSyn,
    /// The peer sent `SYN`.
    RecvSyn,
    /// This side sent `ACK`.
    SendAck,
    /// The peer sent `ACK`.
    RecvAck,
    /// This side sent `FIN`.
    SendFin,
    /// The peer sent `FIN`.
    RecvFin,
    /// Either side reset the stream.
    Reset,
}

/// Returned when an event is not valid in the current state.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("invalid stream transition: {event:?} in {from:?}")]
pub struct TransitionError {
    /// State the stream was in.
    pub from: StreamState,
    /// Event that was rejected.
    pub event: StreamEvent,
}

impl StreamState {
    /// Compute the state that follows `event`.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] if `event` is not valid in this state.
    /// No event leaves [`StreamState::Closed`].
    ///
    /// # Examples
    ///
    /// ```
    /// use muxframe::stream::{StreamEvent, StreamState};
    ///
    /// let state = StreamState::Established
    ///     .on(StreamEvent::SendFin)
    ///     .and_then(|s| s.on(StreamEvent::RecvFin))
    ///     .expect("valid transitions");
    /// assert_eq!(state, StreamState::Closed);
    /// ```
    pub fn on(self, event: StreamEvent) -> Result<Self, TransitionError> {
        use StreamEvent as E;
        use StreamState as S;

        let next = match (self, event) {
            (S::Closed, _) => None,
            (_, E::Reset) => Some(S::Closed),
            (S::Idle, E::SendSyn) => Some(S::SynSent),
            (S::Idle, E::RecvSyn) => Some(S::SynReceived),
            (S::SynSent, E::RecvAck) => Some(S::Established),
            (S::SynReceived, E::SendAck) => Some(S::Established),
            (S::SynSent | S::SynReceived | S::Established, E::SendFin) => Some(S::LocalClose),
            (S::SynSent | S::SynReceived | S::Established, E::RecvFin) => Some(S::RemoteClose),
            (S::RemoteClose, E::SendFin) | (S::LocalClose, E::RecvFin) => Some(S::Closed),
            // A late ACK after a half-close changes nothing.
            (S::LocalClose | S::RemoteClose, E::RecvAck | E::SendAck) => Some(self),
            _ => None,
        };
        next.ok_or(TransitionError { from: self, event })
    }

    /// Returns true once no further frames may be sent by this side.
    #[must_use]
    pub const fn is_write_closed(self) -> bool {
        matches!(self, Self::LocalClose | Self::Closed)
    }

    /// Returns true once the peer will send no more data.
    #[must_use]
    pub const fn is_read_closed(self) -> bool {
        matches!(self, Self::RemoteClose | Self::Closed)
    }

    /// Returns true for the terminal state.
    #[must_use]
    pub const fn is_closed(self) -> bool { matches!(self, Self::Closed) }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{StreamEvent as E, StreamState as S, TransitionError};

    #[rstest]
    #[case::open_local(S::Idle, E::SendSyn, S::SynSent)]
    #[case::open_remote(S::Idle, E::RecvSyn, S::SynReceived)]
    #[case::acked(S::SynSent, E::RecvAck, S::Established)]
    #[case::acking(S::SynReceived, E::SendAck, S::Established)]
    #[case::local_fin(S::Established, E::SendFin, S::LocalClose)]
    #[case::remote_fin(S::Established, E::RecvFin, S::RemoteClose)]
    #[case::fin_before_ack(S::SynSent, E::SendFin, S::LocalClose)]
    #[case::local_then_remote(S::LocalClose, E::RecvFin, S::Closed)]
    #[case::remote_then_local(S::RemoteClose, E::SendFin, S::Closed)]
    #[case::late_ack(S::LocalClose, E::RecvAck, S::LocalClose)]
    #[case::reset_open(S::Established, E::Reset, S::Closed)]
    #[case::reset_half_closed(S::RemoteClose, E::Reset, S::Closed)]
    fn valid_transitions(#[case] from: S, #[case] event: E, #[case] to: S) {
        assert_eq!(from.on(event), Ok(to));
    }

    #[rstest]
    #[case(S::Closed, E::RecvSyn)]
    #[case(S::Closed, E::Reset)]
    #[case(S::Established, E::RecvSyn)]
    #[case(S::LocalClose, E::SendFin)]
    #[case(S::RemoteClose, E::RecvFin)]
    #[case(S::Idle, E::RecvAck)]
    fn invalid_transitions_are_rejected(#[case] from: S, #[case] event: E) {
        assert_eq!(from.on(event), Err(TransitionError { from, event }));
    }

    #[test]
    fn half_close_symmetry() {
        let local_first = S::Established.on(E::SendFin).and_then(|s| s.on(E::RecvFin));
        let remote_first = S::Established.on(E::RecvFin).and_then(|s| s.on(E::SendFin));
        assert_eq!(local_first, Ok(S::Closed));
        assert_eq!(remote_first, Ok(S::Closed));
    }
}
