//! Media engine interface
//!
//! The session drives playback through [`MediaEngine`] and learns about
//! finished or failed tracks through a separate [`EngineEvents`] handle, so
//! the event poller can block on events without holding the session lock.

use std::path::{ Path, PathBuf };
use std::sync::atomic::{ AtomicU64, Ordering };
use std::sync::mpsc::{ self, Receiver, RecvTimeoutError, Sender };
use std::sync::Arc;
use std::time::{ Duration, Instant };

use thiserror::Error;


const URI_SCHEMES: &[&str] = &[ "file://", "http://", "https://" ];


/// Errors reported by a media engine.
#[derive( Debug, Error )]
pub enum EngineError {
    #[error( "Unsupported location: {0}" )]
    Unsupported( String ),

    #[error( "No location set" )]
    NoLocation,

    #[error( "{0}" )]
    Backend( String ),
}


/// Something that happened inside the engine.
#[derive( Debug, Clone, PartialEq, Eq )]
pub enum EngineEvent {
    EndOfStream,
    Error( String ),
    /// Nothing happened before the poll timed out.
    None,
}


/// Playback backend controlled by the session.
pub trait MediaEngine: Send {
    /// Loads a URI. Takes effect on the next [`play`](Self::play).
    fn set_location( &mut self, uri: &str ) -> Result<(), EngineError>;

    fn play( &mut self ) -> Result<(), EngineError>;

    fn pause( &mut self ) -> Result<(), EngineError>;

    fn stop( &mut self ) -> Result<(), EngineError>;

    /// Sets the output volume, 0.0 to 1.0.
    fn set_volume( &mut self, volume: f32 );
}


/// Sending half of the engine event channel, kept by the engine.
///
/// Each loaded track gets a new generation; events tagged with an older
/// generation are dropped by [`EngineEvents::poll`], so a track that ends
/// just as it is being replaced cannot cause a second advance.
#[derive( Debug, Clone )]
pub struct EventSender {
    tx: Sender<( u64, EngineEvent )>,
    generation: Arc<AtomicU64>,
}


impl EventSender {
    /// Starts a new generation and returns its id.
    pub fn begin( &self ) -> u64 {
        self.generation.fetch_add( 1, Ordering::SeqCst ) + 1
    }


    /// The generation events are currently accepted for.
    pub fn current( &self ) -> u64 {
        self.generation.load( Ordering::SeqCst )
    }


    pub fn send( &self, generation: u64, event: EngineEvent ) {
        // The poller may be gone during shutdown.
        let _ = self.tx.send(( generation, event ));
    }
}


/// Receiving half of the engine event channel, owned by the event poller.
#[derive( Debug )]
pub struct EngineEvents {
    rx: Receiver<( u64, EngineEvent )>,
    generation: Arc<AtomicU64>,
}


impl EngineEvents {
    /// Waits up to `timeout` for an event of the current generation.
    pub fn poll( &self, timeout: Duration ) -> EngineEvent {
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since( Instant::now() );
            match self.rx.recv_timeout( remaining ) {
                Ok(( generation, event )) => {
                    if generation == self.generation.load( Ordering::SeqCst ) {
                        return event;
                    }
                    tracing::debug!( "Dropping stale engine event {:?} from generation {}", event, generation );
                }
                Err( RecvTimeoutError::Timeout ) => return EngineEvent::None,
                Err( RecvTimeoutError::Disconnected ) => {
                    std::thread::sleep( remaining );
                    return EngineEvent::None;
                }
            }
        }
    }
}


/// Creates a connected engine event channel.
pub fn event_channel() -> ( EventSender, EngineEvents ) {
    let ( tx, rx ) = mpsc::channel();
    let generation = Arc::new( AtomicU64::new( 0 ) );
    (
        EventSender { tx, generation: Arc::clone( &generation ) },
        EngineEvents { rx, generation },
    )
}


/// Returns the URI form of a location.
///
/// Locations that already carry a supported scheme are returned as they
/// are; absolute paths get a `file://` prefix; relative paths are resolved
/// against `cwd` first.
pub fn make_uri( location: &str, cwd: &Path ) -> String {
    if URI_SCHEMES.iter().any( |s| location.starts_with( s ) ) {
        location.to_string()
    } else if location.starts_with( '/' ) {
        format!( "file://{}", location )
    } else {
        format!( "file://{}", cwd.join( location ).display() )
    }
}


/// Returns the local path behind a `file://` URI.
pub fn uri_to_path( uri: &str ) -> Option<PathBuf> {
    uri.strip_prefix( "file://" ).map( PathBuf::from )
}


/// Engine that accepts every call and never produces sound or events.
/// Used when the daemon is built without an audio backend.
#[derive( Debug, Default )]
pub struct NullEngine {
    location: Option<String>,
    volume: f32,
}


impl MediaEngine for NullEngine {
    fn set_location( &mut self, uri: &str ) -> Result<(), EngineError> {
        self.location = Some( uri.to_string() );
        Ok(())
    }

    fn play( &mut self ) -> Result<(), EngineError> {
        match self.location {
            Some( ref uri ) => {
                tracing::info!( "Null engine playing {}", uri );
                Ok(())
            }
            None => Err( EngineError::NoLocation ),
        }
    }

    fn pause( &mut self ) -> Result<(), EngineError> {
        Ok(())
    }

    fn stop( &mut self ) -> Result<(), EngineError> {
        Ok(())
    }

    fn set_volume( &mut self, volume: f32 ) {
        self.volume = volume;
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_make_uri_passes_qualified_uris_through() {
        let cwd = Path::new( "/home/me" );
        assert_eq!( make_uri( "file:///a.mp3", cwd ), "file:///a.mp3" );
        assert_eq!( make_uri( "http://x/stream", cwd ), "http://x/stream" );
        assert_eq!( make_uri( "https://x/stream", cwd ), "https://x/stream" );
    }


    #[test]
    fn test_make_uri_qualifies_paths() {
        let cwd = Path::new( "/home/me" );
        assert_eq!( make_uri( "/music/a.mp3", cwd ), "file:///music/a.mp3" );
        assert_eq!( make_uri( "music/a.mp3", cwd ), "file:///home/me/music/a.mp3" );
    }


    #[test]
    fn test_uri_to_path() {
        assert_eq!( uri_to_path( "file:///music/a.mp3" ), Some( PathBuf::from( "/music/a.mp3" ) ) );
        assert_eq!( uri_to_path( "http://x" ), None );
    }


    #[test]
    fn test_poll_times_out_with_none() {
        let ( _tx, events ) = event_channel();
        assert_eq!( events.poll( Duration::from_millis( 10 ) ), EngineEvent::None );
    }


    #[test]
    fn test_poll_drops_stale_generations() {
        let ( tx, events ) = event_channel();
        let old = tx.begin();
        let new = tx.begin();

        tx.send( old, EngineEvent::EndOfStream );
        tx.send( new, EngineEvent::Error( "bad".into() ) );

        assert_eq!( events.poll( Duration::from_millis( 100 ) ), EngineEvent::Error( "bad".into() ) );
        assert_eq!( events.poll( Duration::from_millis( 10 ) ), EngineEvent::None );
    }


    #[test]
    fn test_null_engine_needs_a_location() {
        let mut engine = NullEngine::default();
        assert!( engine.play().is_err() );
        engine.set_location( "file:///a.mp3" ).unwrap();
        assert!( engine.play().is_ok() );
    }
}
