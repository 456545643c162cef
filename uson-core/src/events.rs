//! Link events consumed by the story engine

use uson_protocol::InputEvent;

use crate::liveness::LinkTransition;

/// Events raised by the link layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkEvent {
    // Link lifecycle
    /// Debounced link came up
    LinkUp,
    /// Debounced link went down
    LinkDown,
    /// Peer uptime rewound; silence is expected for a while
    PeerRestarting,

    // Peer requests
    /// Button or touch input from a screen board
    Input(InputEvent),
    /// Peer asked for a full resync
    KeyframeRequested,
}

impl LinkEvent {
    /// Map a liveness edge to its event
    pub fn from_transition(transition: LinkTransition) -> Self {
        match transition {
            LinkTransition::Up => LinkEvent::LinkUp,
            LinkTransition::Down => LinkEvent::LinkDown,
        }
    }

    /// Returns true if this event carries user input
    pub fn is_input(&self) -> bool {
        matches!(self, LinkEvent::Input(_))
    }

    /// Returns true if this event is about link health
    pub fn is_link_event(&self) -> bool {
        matches!(
            self,
            LinkEvent::LinkUp | LinkEvent::LinkDown | LinkEvent::PeerRestarting
        )
    }
}
