//! Input replay: translates recorded button-state samples into minimal
//! press/release key events against a target window.
//!
//! The actual window lookup and key injection are behind the
//! [`WindowLocator`] and [`KeyInjector`] traits so playback logic can be
//! tested with a virtual backend.

mod buttons;
mod inject;
mod player;
mod recording;
mod state;

pub use buttons::Button;
pub use inject::{KeyCode, KeyInjector, LoggingBackend, VirtualBackend, WindowHandle, WindowLocator};
pub use player::{InputPlayer, PlaybackOptions, PlaybackSummary};
pub use recording::{Recording, Sample};
pub use state::{ActiveKeys, KeyTransition};
