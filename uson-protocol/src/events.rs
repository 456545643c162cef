//! Input events sent from the screen boards (BTN / TOUCH lines)

/// Physical button transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ButtonAction {
    /// Button pressed
    Down,
    /// Button released
    Up,
    /// Short press (<500 ms)
    Click,
    /// Long press (>=500 ms)
    LongPress,
}

/// Touch panel transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TouchAction {
    Down,
    Move,
    Up,
}

// Wire format values
const ACTION_DOWN: &str = "down";
const ACTION_UP: &str = "up";
const ACTION_CLICK: &str = "click";
const ACTION_LONG: &str = "long";
const ACTION_MOVE: &str = "move";

impl ButtonAction {
    /// Parse an action from its wire token
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            ACTION_DOWN => Some(ButtonAction::Down),
            ACTION_UP => Some(ButtonAction::Up),
            ACTION_CLICK => Some(ButtonAction::Click),
            ACTION_LONG => Some(ButtonAction::LongPress),
            _ => None,
        }
    }

    /// Convert to wire token
    pub fn token(self) -> &'static str {
        match self {
            ButtonAction::Down => ACTION_DOWN,
            ButtonAction::Up => ACTION_UP,
            ButtonAction::Click => ACTION_CLICK,
            ButtonAction::LongPress => ACTION_LONG,
        }
    }
}

impl TouchAction {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            ACTION_DOWN => Some(TouchAction::Down),
            ACTION_MOVE => Some(TouchAction::Move),
            ACTION_UP => Some(TouchAction::Up),
            _ => None,
        }
    }

    pub fn token(self) -> &'static str {
        match self {
            TouchAction::Down => ACTION_DOWN,
            TouchAction::Move => ACTION_MOVE,
            TouchAction::Up => ACTION_UP,
        }
    }
}

/// A button event (`BTN,id=..,action=..,ts=..`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ButtonEvent {
    /// Button index on the sending board
    pub id: u8,
    pub action: ButtonAction,
    /// Sender uptime when the event fired (ms)
    pub ts: u32,
}

/// A touch event (`TOUCH,x=..,y=..,action=..,ts=..`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TouchEvent {
    pub x: u16,
    pub y: u16,
    pub action: TouchAction,
    pub ts: u32,
}

/// Input event decoded from a screen board
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InputEvent {
    Button(ButtonEvent),
    Touch(TouchEvent),
}

impl InputEvent {
    /// Returns true if this is a button event
    pub fn is_button(&self) -> bool {
        matches!(self, InputEvent::Button(_))
    }

    /// Returns true if this is a touch event
    pub fn is_touch(&self) -> bool {
        matches!(self, InputEvent::Touch(_))
    }

    /// Sender timestamp of the event
    pub fn timestamp(&self) -> u32 {
        match self {
            InputEvent::Button(b) => b.ts,
            InputEvent::Touch(t) => t.ts,
        }
    }

    /// Returns true for the events that complete a user gesture
    pub fn is_release(&self) -> bool {
        match self {
            InputEvent::Button(b) => matches!(
                b.action,
                ButtonAction::Up | ButtonAction::Click | ButtonAction::LongPress
            ),
            InputEvent::Touch(t) => t.action == TouchAction::Up,
        }
    }
}
