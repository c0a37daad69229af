//! mmusic core - playback control plane
//!
//! Session state, the durable upcoming queue, playlist expansion and the
//! named pipe command protocol shared by the `mmusicd` daemon and its
//! clients. The audio engine lives behind the `audio` feature.

pub mod channel;
pub mod command;
pub mod engine;
pub mod library;
pub mod paths;
pub mod playlist;
pub mod queue;
pub mod session;
pub mod status;

#[cfg( feature = "audio" )]
pub mod decoder;
#[cfg( feature = "audio" )]
pub mod output;
#[cfg( feature = "audio" )]
pub mod player;

pub use channel::{ ChannelError, SharedSession };
pub use command::{ Command, CommandError };
pub use engine::{ EngineError, EngineEvent, EngineEvents, MediaEngine, NullEngine };
pub use library::{ ExclusionSet, ExpandError };
pub use paths::{ SessionDirError, SessionPaths };
pub use playlist::Library;
pub use queue::{ QueueError, QueueFile };
pub use session::{ Advance, Flow, PlayMode, Session, SessionError, SessionOptions, SessionState };
pub use status::StatusSnapshot;

#[cfg( feature = "audio" )]
pub use player::Player;
