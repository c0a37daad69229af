//! Playback session state machine
//!
//! Owns the library, the upcoming queue and the media engine, and applies
//! every [`Command`] to them. After each transition the visible parts of the
//! state are published to the session directory for clients to read.

use std::fs::{ self, File };
use std::io;
use std::path::{ Path, PathBuf };

use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;

use crate::command::Command;
use crate::engine::{ make_uri, EngineEvent, MediaEngine };
use crate::library::{ self, ExpandError };
use crate::paths::SessionPaths;
use crate::playlist::Library;
use crate::queue::{ write_atomic, QueueError, QueueFile };


/// Volume change applied by `increase` and `decrease`.
pub const VOLUME_STEP: f32 = 0.01;


/// Errors that can occur during a session transition.
#[derive( Debug, Error )]
pub enum SessionError {
    #[error( transparent )]
    Expand( #[from] ExpandError ),

    #[error( transparent )]
    Queue( #[from] QueueError ),

    #[error( "Failed to publish {path}: {source}" )]
    Publish { path: PathBuf, source: io::Error },

    #[error( "Failed to remove session directory: {0}" )]
    Teardown( io::Error ),
}


/// How the next library entry is chosen.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum PlayMode {
    #[default]
    Sequential,
    Random,
}


/// Authoritative playback state.
#[derive( Debug, Clone, PartialEq )]
pub struct SessionState {
    pub mode: PlayMode,
    pub paused: bool,
    /// 0.0 to 1.0
    pub volume: f32,
    pub current: Option<String>,
    /// True when `current` was taken from the queue rather than the library.
    pub current_is_queued: bool,
}


impl Default for SessionState {
    fn default() -> Self {
        Self {
            mode: PlayMode::Sequential,
            paused: false,
            volume: 0.5,
            current: None,
            current_is_queued: false,
        }
    }
}


/// Outcome of an advance.
#[derive( Debug, Clone, PartialEq, Eq )]
pub enum Advance {
    Playing { location: String, from_queue: bool },
    NothingToPlay,
}


/// Whether the daemon keeps running after a command.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum Flow {
    Continue,
    Exit,
}


/// Startup options for a session.
#[derive( Debug, Clone, Copy, PartialEq )]
pub struct SessionOptions {
    pub mode: PlayMode,
    pub volume: f32,
}


impl Default for SessionOptions {
    fn default() -> Self {
        Self { mode: PlayMode::Random, volume: 0.5 }
    }
}


/// One daemon's playback session.
pub struct Session<E: MediaEngine> {
    paths: SessionPaths,
    engine: E,
    library: Library,
    queue: QueueFile,
    state: SessionState,
    /// Library index of `current`, when it came from the library.
    position: Option<usize>,
    rng: StdRng,
    cwd: PathBuf,
}


impl<E: MediaEngine> Session<E> {
    /// Creates a session over an existing session directory and publishes
    /// the initial mode and volume. The library starts empty; call
    /// [`rescan`](Self::rescan) to load it.
    pub fn new( paths: SessionPaths, engine: E, options: SessionOptions ) -> Result<Self, SessionError> {
        let cwd = std::env::current_dir().unwrap_or_else( |_| PathBuf::from( "/" ) );
        let queue = QueueFile::new( paths.upcoming() );

        let mut session = Self {
            paths,
            engine,
            library: Library::default(),
            queue,
            state: SessionState::default(),
            position: None,
            rng: StdRng::from_entropy(),
            cwd,
        };

        match options.mode {
            PlayMode::Random => session.set_random()?,
            PlayMode::Sequential => session.set_normal()?,
        }
        session.set_volume( options.volume )?;
        set_marker( &session.paths.is_paused(), false )?;

        Ok( session )
    }


    /// Replaces the random source, for reproducible selection.
    pub fn with_rng( mut self, rng: StdRng ) -> Self {
        self.rng = rng;
        self
    }


    /// Directory relative locations are resolved against.
    pub fn with_cwd( mut self, cwd: impl Into<PathBuf> ) -> Self {
        self.cwd = cwd.into();
        self
    }


    pub fn state( &self ) -> &SessionState {
        &self.state
    }

    pub fn library( &self ) -> &Library {
        &self.library
    }

    pub fn queue( &self ) -> &QueueFile {
        &self.queue
    }

    pub fn paths( &self ) -> &SessionPaths {
        &self.paths
    }

    pub fn engine( &self ) -> &E {
        &self.engine
    }


    /// Applies one command. Runtime failures are logged, never returned:
    /// a bad command must not take the session down.
    pub fn dispatch( &mut self, command: Command ) -> Flow {
        tracing::debug!( "Dispatching {}", command );

        let result = match command {
            Command::Next => self.advance().map( |_| () ),
            Command::Scan => self.rescan(),
            Command::Random => self.set_random(),
            Command::Normal => self.set_normal(),
            Command::Pause => self.pause(),
            Command::Resume => self.resume(),
            Command::Increase => self.adjust_volume( VOLUME_STEP ),
            Command::Decrease => self.adjust_volume( -VOLUME_STEP ),
            Command::Mute => self.set_volume( 0.0 ),
            Command::Exit => {
                if let Err( e ) = self.exit() {
                    tracing::error!( "{}", e );
                }
                return Flow::Exit;
            }
        };

        if let Err( e ) = result {
            tracing::warn!( "{} failed: {}", command, e );
        }
        Flow::Continue
    }


    /// Reacts to an engine event. End of stream and errors both move on to
    /// the next entry. Returns true if the session advanced.
    pub fn handle_engine_event( &mut self, event: EngineEvent ) -> bool {
        match event {
            EngineEvent::None => false,
            EngineEvent::EndOfStream => {
                tracing::debug!( "End of stream" );
                self.dispatch( Command::Next );
                true
            }
            EngineEvent::Error( details ) => {
                tracing::warn!( "Engine error on {:?}: {}", self.state.current, details );
                self.dispatch( Command::Next );
                true
            }
        }
    }


    /// Moves to the next entry: queue first, then a random or sequential
    /// library pick.
    pub fn advance( &mut self ) -> Result<Advance, SessionError> {
        let queued = match self.queue.pop() {
            Ok( entry ) => entry,
            Err( e ) => {
                tracing::warn!( "Could not read queue, falling back to library: {}", e );
                None
            }
        };

        if let Some( location ) = queued {
            self.position = None;
            self.state.current_is_queued = true;
            self.start( location.clone() )?;
            return Ok( Advance::Playing { location, from_queue: true } );
        }

        let index = match self.state.mode {
            PlayMode::Random => self.library.random( &mut self.rng ),
            PlayMode::Sequential => match self.position {
                Some( idx ) if !self.state.current_is_queued && self.state.current.is_some() => {
                    self.library.successor( idx )
                }
                _ => self.library.first(),
            },
        };

        let picked = index.and_then( |i| self.library.get( i ).map( |loc| ( i, loc.to_string() ) ) );
        let Some(( index, location )) = picked else {
            tracing::info!( "There is nothing to play" );
            return Ok( Advance::NothingToPlay );
        };

        self.position = Some( index );
        self.state.current_is_queued = false;
        self.start( location.clone() )?;
        Ok( Advance::Playing { location, from_queue: false } )
    }


    pub fn toggle_pause( &mut self ) -> Result<(), SessionError> {
        if self.state.paused { self.resume() } else { self.pause() }
    }


    pub fn pause( &mut self ) -> Result<(), SessionError> {
        if let Err( e ) = self.engine.pause() {
            tracing::warn!( "Engine refused to pause: {}", e );
        }
        self.state.paused = true;
        set_marker( &self.paths.is_paused(), true )
    }


    pub fn resume( &mut self ) -> Result<(), SessionError> {
        if let Err( e ) = self.engine.play() {
            tracing::warn!( "Engine refused to resume: {}", e );
        }
        self.state.paused = false;
        set_marker( &self.paths.is_paused(), false )
    }


    pub fn set_random( &mut self ) -> Result<(), SessionError> {
        self.state.mode = PlayMode::Random;
        set_marker( &self.paths.is_random(), true )
    }


    pub fn set_normal( &mut self ) -> Result<(), SessionError> {
        self.state.mode = PlayMode::Sequential;
        set_marker( &self.paths.is_random(), false )
    }


    /// Changes the volume by `delta`, clamped to 0.0 to 1.0.
    pub fn adjust_volume( &mut self, delta: f32 ) -> Result<(), SessionError> {
        self.set_volume( self.state.volume + delta )
    }


    pub fn set_volume( &mut self, volume: f32 ) -> Result<(), SessionError> {
        let volume = if volume.is_nan() { 0.0 } else { volume.clamp( 0.0, 1.0 ) };
        self.state.volume = volume;
        self.engine.set_volume( volume );

        let percent = ( volume * 100.0 ).round() as u32;
        publish( &self.paths.volume(), &format!( "{}\n", percent ) )
    }


    /// Rebuilds the library from the playlist file. The current entry is
    /// found again by value, or the position falls back to the first entry.
    pub fn rescan( &mut self ) -> Result<(), SessionError> {
        let entries = library::expand_file( &self.paths.playlist() )?;
        self.library = Library::new( entries );

        if !self.state.current_is_queued {
            if let Some( ref current ) = self.state.current {
                self.position = self.library.relocate( current );
            }
        }

        tracing::info!( "Library has {} entries", self.library.len() );
        Ok(())
    }


    /// Stops playback and removes the session directory. The caller is
    /// expected to terminate the process afterwards.
    pub fn exit( &mut self ) -> Result<(), SessionError> {
        tracing::info!( "Exiting" );
        if let Err( e ) = self.engine.stop() {
            tracing::warn!( "Engine refused to stop: {}", e );
        }
        self.paths.remove().map_err( SessionError::Teardown )
    }


    fn start( &mut self, location: String ) -> Result<(), SessionError> {
        let uri = make_uri( &location, &self.cwd );
        tracing::info!( "Playing {}", uri );

        if let Err( e ) = self.engine.stop() {
            tracing::warn!( "Engine refused to stop: {}", e );
        }
        if let Err( e ) = self.engine.set_location( &uri ).and_then( |_| self.engine.play() ) {
            tracing::warn!( "Failed to start {}: {}", uri, e );
        }

        self.state.current = Some( location );
        self.state.paused = false;
        set_marker( &self.paths.is_paused(), false )?;

        let playing = format!( "{}\n", self.state.current.as_deref().unwrap_or_default() );
        publish( &self.paths.playing(), &playing )
    }
}


/// Atomically replaces a published file.
fn publish( path: &Path, content: &str ) -> Result<(), SessionError> {
    write_atomic( path, content.as_bytes() )
        .map_err( |source| SessionError::Publish { path: path.to_path_buf(), source } )
}


/// Creates or removes a zero byte marker file.
fn set_marker( path: &Path, present: bool ) -> Result<(), SessionError> {
    let result = if present {
        File::create( path ).map( |_| () )
    } else {
        match fs::remove_file( path ) {
            Err( e ) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    };
    result.map_err( |source| SessionError::Publish { path: path.to_path_buf(), source } )
}


#[cfg( test )]
mod tests {
    use super::*;

    use crate::engine::EngineError;


    #[derive( Debug, Clone, PartialEq )]
    enum Call {
        SetLocation( String ),
        Play,
        Pause,
        Stop,
        Volume( f32 ),
    }


    #[derive( Debug, Default )]
    struct RecordingEngine {
        calls: Vec<Call>,
    }


    impl MediaEngine for RecordingEngine {
        fn set_location( &mut self, uri: &str ) -> Result<(), EngineError> {
            self.calls.push( Call::SetLocation( uri.to_string() ) );
            Ok(())
        }

        fn play( &mut self ) -> Result<(), EngineError> {
            self.calls.push( Call::Play );
            Ok(())
        }

        fn pause( &mut self ) -> Result<(), EngineError> {
            self.calls.push( Call::Pause );
            Ok(())
        }

        fn stop( &mut self ) -> Result<(), EngineError> {
            self.calls.push( Call::Stop );
            Ok(())
        }

        fn set_volume( &mut self, volume: f32 ) {
            self.calls.push( Call::Volume( volume ) );
        }
    }


    struct Fixture {
        _dir: tempfile::TempDir,
        session: Session<RecordingEngine>,
    }


    fn fixture( entries: &[ &str ], mode: PlayMode ) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let paths = SessionPaths::new( dir.path().join( "session" ) );
        paths.create().unwrap();

        let mut text = entries.join( "\n" );
        text.push( '\n' );
        fs::write( paths.playlist(), text ).unwrap();

        let options = SessionOptions { mode, volume: 0.5 };
        let mut session = Session::new( paths, RecordingEngine::default(), options )
            .unwrap()
            .with_rng( StdRng::seed_from_u64( 7 ) )
            .with_cwd( "/cwd" );
        session.rescan().unwrap();

        Fixture { _dir: dir, session }
    }


    fn next( session: &mut Session<RecordingEngine> ) -> Option<String> {
        match session.advance().unwrap() {
            Advance::Playing { location, .. } => Some( location ),
            Advance::NothingToPlay => None,
        }
    }


    fn read( path: PathBuf ) -> String {
        fs::read_to_string( path ).unwrap()
    }


    #[test]
    fn test_sequential_advance_wraps() {
        let mut fx = fixture( &[ "/m/A", "/m/B", "/m/C" ], PlayMode::Sequential );
        let s = &mut fx.session;

        assert_eq!( next( s ).as_deref(), Some( "/m/A" ) );
        assert_eq!( next( s ).as_deref(), Some( "/m/B" ) );
        assert_eq!( next( s ).as_deref(), Some( "/m/C" ) );
        assert_eq!( next( s ).as_deref(), Some( "/m/A" ) );
    }


    #[test]
    fn test_sequential_cycle_visits_each_entry_once() {
        let names: Vec<String> = ( 0..7 ).map( |i| format!( "/m/{}", i ) ).collect();
        let refs: Vec<&str> = names.iter().map( String::as_str ).collect();
        let mut fx = fixture( &refs, PlayMode::Sequential );

        for _round in 0..3 {
            let mut seen: Vec<String> = ( 0..names.len() )
                .map( |_| next( &mut fx.session ).unwrap() )
                .collect();
            seen.sort();
            let mut expected = names.clone();
            expected.sort();
            assert_eq!( seen, expected );
        }
    }


    #[test]
    fn test_queue_wins_then_library_restarts_from_head() {
        let mut fx = fixture( &[ "/m/A", "/m/B" ], PlayMode::Sequential );
        let s = &mut fx.session;

        assert_eq!( next( s ).as_deref(), Some( "/m/A" ) );
        s.queue().push_back( "/q/X" ).unwrap();

        assert_eq!( s.advance().unwrap(), Advance::Playing { location: "/q/X".into(), from_queue: true } );
        assert!( s.state().current_is_queued );
        assert!( s.queue().is_empty().unwrap() );

        assert_eq!( next( s ).as_deref(), Some( "/m/A" ) );
        assert!( !s.state().current_is_queued );
    }


    #[test]
    fn test_queue_wins_in_random_mode() {
        let mut fx = fixture( &[ "/m/A", "/m/B" ], PlayMode::Random );
        let s = &mut fx.session;

        s.queue().push_back( "/q/X" ).unwrap();
        s.queue().push_back( "/q/Y" ).unwrap();

        assert_eq!( next( s ).as_deref(), Some( "/q/X" ) );
        assert_eq!( next( s ).as_deref(), Some( "/q/Y" ) );
    }


    #[test]
    fn test_oversized_queue_head_does_not_block_queue() {
        let mut fx = fixture( &[ "/m/A", "/m/B" ], PlayMode::Sequential );
        let s = &mut fx.session;

        let long = "x".repeat( crate::queue::MAX_ENTRY_LEN + 3 );
        fs::write( s.queue().path(), format!( "{}\n/q/X\n", long ) ).unwrap();

        assert_eq!( s.advance().unwrap(), Advance::Playing { location: "/q/X".into(), from_queue: true } );
        assert!( s.queue().is_empty().unwrap() );
        assert_eq!( next( s ).as_deref(), Some( "/m/A" ) );
    }


    #[test]
    fn test_blank_queue_line_is_not_played() {
        let mut fx = fixture( &[ "/m/A", "/m/B" ], PlayMode::Sequential );
        let s = &mut fx.session;

        fs::write( s.queue().path(), "   \n/q/X\n" ).unwrap();

        assert_eq!( s.queue().entries().unwrap(), vec![ "/q/X" ] );
        assert_eq!( s.advance().unwrap(), Advance::Playing { location: "/q/X".into(), from_queue: true } );
    }


    #[test]
    fn test_random_stays_in_library() {
        let mut fx = fixture( &[ "/m/A", "/m/B", "/m/C" ], PlayMode::Random );
        for _ in 0..200 {
            let location = next( &mut fx.session ).unwrap();
            assert!( fx.session.library().position( &location ).is_some() );
        }
    }


    #[test]
    fn test_random_with_single_entry() {
        let mut fx = fixture( &[ "/m/only" ], PlayMode::Random );
        for _ in 0..50 {
            assert_eq!( next( &mut fx.session ).as_deref(), Some( "/m/only" ) );
        }
    }


    #[test]
    fn test_empty_library_and_queue_is_not_fatal() {
        let mut fx = fixture( &[], PlayMode::Sequential );
        assert_eq!( fx.session.advance().unwrap(), Advance::NothingToPlay );
        assert_eq!( fx.session.state().current, None );
        assert!( fx.session.engine().calls.iter().all( |c| matches!( c, Call::Volume( _ ) ) ) );
    }


    #[test]
    fn test_advance_drives_engine_and_publishes() {
        let mut fx = fixture( &[ "rel/A.mp3" ], PlayMode::Sequential );
        let s = &mut fx.session;
        s.pause().unwrap();
        assert!( s.paths().is_paused().exists() );

        next( s );

        let calls = &s.engine().calls;
        let tail = &calls[ calls.len() - 3.. ];
        assert_eq!( tail, &[
            Call::Stop,
            Call::SetLocation( "file:///cwd/rel/A.mp3".into() ),
            Call::Play,
        ]);
        assert!( !s.state().paused );
        assert!( !s.paths().is_paused().exists() );
        assert_eq!( read( s.paths().playing() ), "rel/A.mp3\n" );
    }


    #[test]
    fn test_pause_resume_toggle_markers() {
        let mut fx = fixture( &[ "/m/A" ], PlayMode::Sequential );
        let s = &mut fx.session;

        s.toggle_pause().unwrap();
        assert!( s.state().paused );
        assert!( s.paths().is_paused().exists() );
        assert_eq!( s.engine().calls.last(), Some( &Call::Pause ) );

        s.toggle_pause().unwrap();
        assert!( !s.state().paused );
        assert!( !s.paths().is_paused().exists() );
        assert_eq!( s.engine().calls.last(), Some( &Call::Play ) );
    }


    #[test]
    fn test_mode_markers_do_not_touch_current() {
        let mut fx = fixture( &[ "/m/A", "/m/B" ], PlayMode::Sequential );
        let s = &mut fx.session;
        assert!( !s.paths().is_random().exists() );

        next( s );
        s.dispatch( Command::Random );
        assert_eq!( s.state().mode, PlayMode::Random );
        assert!( s.paths().is_random().exists() );
        assert_eq!( s.state().current.as_deref(), Some( "/m/A" ) );

        s.dispatch( Command::Normal );
        assert!( !s.paths().is_random().exists() );
        assert_eq!( next( s ).as_deref(), Some( "/m/B" ) );
    }


    #[test]
    fn test_volume_clamps_and_publishes_percent() {
        let mut fx = fixture( &[], PlayMode::Sequential );
        let s = &mut fx.session;
        assert_eq!( read( s.paths().volume() ), "50\n" );

        s.dispatch( Command::Increase );
        assert_eq!( read( s.paths().volume() ), "51\n" );

        s.adjust_volume( 5.0 ).unwrap();
        assert_eq!( s.state().volume, 1.0 );
        assert_eq!( read( s.paths().volume() ), "100\n" );
        assert_eq!( s.engine().calls.last(), Some( &Call::Volume( 1.0 ) ) );

        s.dispatch( Command::Mute );
        assert_eq!( read( s.paths().volume() ), "0\n" );

        s.dispatch( Command::Decrease );
        assert_eq!( s.state().volume, 0.0 );
    }


    #[test]
    fn test_rescan_relocates_current_by_value() {
        let mut fx = fixture( &[ "/m/A", "/m/B", "/m/C" ], PlayMode::Sequential );
        let s = &mut fx.session;
        next( s );
        next( s );
        assert_eq!( s.state().current.as_deref(), Some( "/m/B" ) );

        fs::write( s.paths().playlist(), "/m/Z\n/m/B\n/m/Y\n" ).unwrap();
        s.dispatch( Command::Scan );

        assert_eq!( next( s ).as_deref(), Some( "/m/Y" ) );
    }


    #[test]
    fn test_rescan_falls_back_to_first_entry() {
        let mut fx = fixture( &[ "/m/A", "/m/B" ], PlayMode::Sequential );
        let s = &mut fx.session;
        next( s );

        fs::write( s.paths().playlist(), "/m/X\n/m/Y\n/m/Z\n" ).unwrap();
        s.rescan().unwrap();

        assert_eq!( next( s ).as_deref(), Some( "/m/Y" ) );
    }


    #[test]
    fn test_rescan_leaves_queue_alone() {
        let mut fx = fixture( &[ "/m/A" ], PlayMode::Sequential );
        let s = &mut fx.session;
        s.queue().push_back( "/q/X" ).unwrap();

        s.rescan().unwrap();
        assert_eq!( s.queue().entries().unwrap(), vec![ "/q/X" ] );
    }


    #[test]
    fn test_failed_rescan_keeps_library() {
        let mut fx = fixture( &[ "/m/A" ], PlayMode::Sequential );
        let s = &mut fx.session;
        fs::remove_file( s.paths().playlist() ).unwrap();

        assert_eq!( s.dispatch( Command::Scan ), Flow::Continue );
        assert_eq!( s.library().len(), 1 );
    }


    #[test]
    fn test_engine_events_advance() {
        let mut fx = fixture( &[ "/m/A", "/m/B" ], PlayMode::Sequential );
        let s = &mut fx.session;

        assert!( !s.handle_engine_event( EngineEvent::None ) );
        assert!( s.handle_engine_event( EngineEvent::EndOfStream ) );
        assert_eq!( s.state().current.as_deref(), Some( "/m/A" ) );
        assert!( s.handle_engine_event( EngineEvent::Error( "corrupt".into() ) ) );
        assert_eq!( s.state().current.as_deref(), Some( "/m/B" ) );
    }


    #[test]
    fn test_exit_removes_session_directory() {
        let mut fx = fixture( &[ "/m/A" ], PlayMode::Sequential );
        let s = &mut fx.session;

        assert_eq!( s.dispatch( Command::Exit ), Flow::Exit );
        assert!( !s.paths().exists() );
        assert_eq!( s.engine().calls.last(), Some( &Call::Stop ) );
    }
}
